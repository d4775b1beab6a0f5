//! Groups decoded lines into whole transactions.
//!
//! The assembler is a two-state machine. While `Idle` the first line it sees
//! opens a new buffer, whatever that line is. While `Accumulating` every line
//! is appended, and a line starting with [`COMMIT_MARKER`] closes the buffer
//! and hands the finished [`Transaction`] back to the caller.
//!
//! A `BEGIN` marker is never required. Lines arriving in an unexpected place
//! are still accepted; the assembler only reports them as an [`Anomaly`].

use std::fmt;

use tracing::debug;

use crate::lsn::Lsn;
use crate::types::DecodedUnit;

/// Prefix of the line that terminates a transaction.
pub const COMMIT_MARKER: &str = "COMMIT";

/// Prefix of the line that opens a transaction.
pub const BEGIN_MARKER: &str = "BEGIN";

/// A fully assembled transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Every line of the transaction, each followed by `\n`.
    pub text: String,
    /// Number of lines in `text`.
    pub lines: usize,
    /// Position of the first buffered line.
    pub first_lsn: Lsn,
    /// Position of the commit line.
    pub commit_lsn: Lsn,
    /// True when the buffer was opened by something other than a BEGIN line.
    pub headless: bool,
}

/// A line observed outside a well-formed transaction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// The buffer was opened by a line that is not a BEGIN marker.
    MissingBegin,
    /// A BEGIN marker arrived while a transaction was already open.
    NestedBegin,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::MissingBegin => f.write_str("transaction opened without a BEGIN marker"),
            Anomaly::NestedBegin => f.write_str("BEGIN marker inside an open transaction"),
        }
    }
}

/// Outcome of feeding one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// The line was buffered; the transaction is still open.
    Pending,
    /// The line closed the transaction.
    Complete(Transaction),
}

/// Result of [`TransactionAssembler::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub feed: Feed,
    pub anomaly: Option<Anomaly>,
}

impl Step {
    pub fn completed(self) -> Option<Transaction> {
        match self.feed {
            Feed::Complete(tx) => Some(tx),
            Feed::Pending => None,
        }
    }
}

#[derive(Debug)]
struct OpenTransaction {
    buffer: String,
    lines: usize,
    first_lsn: Lsn,
    opened_by_begin: bool,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Accumulating(OpenTransaction),
}

/// Accumulates decoded lines until a commit marker is seen.
#[derive(Debug, Default)]
pub struct TransactionAssembler {
    state: State,
}

impl TransactionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line and advance the state machine.
    pub fn feed(&mut self, unit: &DecodedUnit) -> Step {
        let is_begin = unit.starts_with(BEGIN_MARKER);

        let anomaly = match &self.state {
            State::Idle if !is_begin => Some(Anomaly::MissingBegin),
            State::Accumulating(_) if is_begin => Some(Anomaly::NestedBegin),
            _ => None,
        };

        if let State::Idle = self.state {
            self.state = State::Accumulating(OpenTransaction {
                buffer: String::new(),
                lines: 0,
                first_lsn: unit.lsn,
                opened_by_begin: is_begin,
            });
        }
        let State::Accumulating(open) = &mut self.state else {
            unreachable!("buffer was just opened")
        };

        open.buffer.push_str(&unit.line);
        open.buffer.push('\n');
        open.lines += 1;

        if !unit.starts_with(COMMIT_MARKER) {
            return Step {
                feed: Feed::Pending,
                anomaly,
            };
        }

        let State::Accumulating(open) = std::mem::take(&mut self.state) else {
            unreachable!("buffer is open after append")
        };

        debug!(
            lines = open.lines,
            first_lsn = %open.first_lsn,
            commit_lsn = %unit.lsn,
            "Transaction complete"
        );

        Step {
            feed: Feed::Complete(Transaction {
                text: open.buffer,
                lines: open.lines,
                first_lsn: open.first_lsn,
                commit_lsn: unit.lsn,
                headless: !open.opened_by_begin,
            }),
            anomaly,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Text buffered for the open transaction, empty when idle.
    pub fn buffered(&self) -> &str {
        match &self.state {
            State::Idle => "",
            State::Accumulating(open) => &open.buffer,
        }
    }

    /// Number of lines buffered for the open transaction.
    pub fn pending_lines(&self) -> usize {
        match &self.state {
            State::Idle => 0,
            State::Accumulating(open) => open.lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(lsn: u64, line: &str) -> DecodedUnit {
        DecodedUnit::new(Lsn(lsn), line)
    }

    fn feed_all(assembler: &mut TransactionAssembler, lines: &[&str]) -> Vec<Step> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| assembler.feed(&unit(100 + i as u64, line)))
            .collect()
    }

    #[test]
    fn test_complete_transaction() {
        let mut assembler = TransactionAssembler::new();
        let steps = feed_all(&mut assembler, &["BEGIN 100", "INSERT t1", "COMMIT 100"]);

        assert_eq!(steps[0].feed, Feed::Pending);
        assert_eq!(steps[1].feed, Feed::Pending);

        let tx = steps[2].clone().completed().unwrap();
        assert_eq!(tx.text, "BEGIN 100\nINSERT t1\nCOMMIT 100\n");
        assert_eq!(tx.lines, 3);
        assert_eq!(tx.first_lsn, Lsn(100));
        assert_eq!(tx.commit_lsn, Lsn(102));
        assert!(!tx.headless);

        assert!(steps.iter().all(|s| s.anomaly.is_none()));
        assert!(assembler.is_idle());
        assert_eq!(assembler.buffered(), "");
    }

    #[test]
    fn test_buffer_grows_until_commit() {
        let mut assembler = TransactionAssembler::new();
        feed_all(&mut assembler, &["BEGIN 7", "UPDATE a"]);

        assert!(!assembler.is_idle());
        assert_eq!(assembler.pending_lines(), 2);
        assert_eq!(assembler.buffered(), "BEGIN 7\nUPDATE a\n");
    }

    #[test]
    fn test_consecutive_transactions() {
        let mut assembler = TransactionAssembler::new();
        let steps = feed_all(
            &mut assembler,
            &["BEGIN 1", "INSERT a", "COMMIT 1", "BEGIN 2", "DELETE b", "COMMIT 2"],
        );

        let completed: Vec<_> = steps.into_iter().filter_map(Step::completed).collect();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].text, "BEGIN 1\nINSERT a\nCOMMIT 1\n");
        assert_eq!(completed[1].text, "BEGIN 2\nDELETE b\nCOMMIT 2\n");
    }

    #[test]
    fn test_missing_begin_is_accepted_and_reported() {
        let mut assembler = TransactionAssembler::new();
        let steps = feed_all(&mut assembler, &["INSERT t1", "COMMIT 5"]);

        assert_eq!(steps[0].anomaly, Some(Anomaly::MissingBegin));
        assert_eq!(steps[1].anomaly, None);

        let tx = steps[1].clone().completed().unwrap();
        assert_eq!(tx.text, "INSERT t1\nCOMMIT 5\n");
        assert!(tx.headless);
    }

    #[test]
    fn test_nested_begin_is_accepted_and_reported() {
        let mut assembler = TransactionAssembler::new();
        let steps = feed_all(&mut assembler, &["BEGIN 1", "BEGIN 2", "COMMIT 2"]);

        assert_eq!(steps[1].anomaly, Some(Anomaly::NestedBegin));
        let tx = steps[2].clone().completed().unwrap();
        assert_eq!(tx.text, "BEGIN 1\nBEGIN 2\nCOMMIT 2\n");
    }

    #[test]
    fn test_lone_commit_is_a_transaction() {
        let mut assembler = TransactionAssembler::new();
        let step = assembler.feed(&unit(9, "COMMIT 9"));

        assert_eq!(step.anomaly, Some(Anomaly::MissingBegin));
        let tx = step.completed().unwrap();
        assert_eq!(tx.text, "COMMIT 9\n");
        assert_eq!(tx.first_lsn, tx.commit_lsn);
    }

    #[test]
    fn test_commit_marker_is_a_prefix_match() {
        let mut assembler = TransactionAssembler::new();
        feed_all(&mut assembler, &["BEGIN 1", "table public.t: INSERT: note[text]:'COMMIT'"]);
        assert!(!assembler.is_idle());

        let step = assembler.feed(&unit(200, "COMMITTED"));
        assert!(step.completed().is_some());
    }

    #[test]
    fn test_empty_line_is_buffered() {
        let mut assembler = TransactionAssembler::new();
        feed_all(&mut assembler, &["BEGIN 1", ""]);
        assert_eq!(assembler.buffered(), "BEGIN 1\n\n");
    }
}
