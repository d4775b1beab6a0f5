use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use slotstream_core::Lsn;

use crate::error::{PgError, PgResult};
use crate::replication::ChangeRow;
use crate::source::ChangeSource;

/// A scripted change source for testing.
///
/// Clones share state, so a test can keep a handle for inspection after
/// moving the source into a session.
#[derive(Clone)]
pub struct MockSource {
    slot: String,
    state: Arc<Mutex<MockState>>,
}

/// One scripted outcome of `poll`.
#[derive(Debug, Clone)]
pub enum MockPoll {
    Row(ChangeRow),
    Empty,
    Fail(String),
}

#[derive(Default)]
struct MockState {
    script: VecDeque<MockPoll>,
    /// Number of upcoming `connect` calls that fail.
    fail_connects: usize,
    /// Failures reported by the next `close`.
    close_errors: Vec<String>,
    connected: bool,
    stream_open: bool,
    connects: usize,
    /// Start position of every stream opened.
    opens: Vec<Option<Lsn>>,
    closes: usize,
    discards: usize,
    position: Option<Lsn>,
}

impl MockSource {
    pub fn new(slot: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queue a row with the given text.
    pub fn push_line(&self, lsn: u64, xid: u32, line: &str) -> &Self {
        self.push(MockPoll::Row(ChangeRow::new(Lsn(lsn), Some(xid), line.as_bytes())))
    }

    /// Queue a "no data" poll.
    pub fn push_empty(&self) -> &Self {
        self.push(MockPoll::Empty)
    }

    /// Queue a poll that fails with a stream error.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(MockPoll::Fail(message.into()))
    }

    pub fn push(&self, poll: MockPoll) -> &Self {
        self.state.lock().unwrap().script.push_back(poll);
        self
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) {
        self.state.lock().unwrap().fail_connects = count;
    }

    /// Make the next close report a teardown failure.
    pub fn fail_close(&self, message: impl Into<String>) {
        self.state.lock().unwrap().close_errors.push(message.into());
    }

    /// Number of connections established.
    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    /// Start positions of the streams opened, in order.
    pub fn opens(&self) -> Vec<Option<Lsn>> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// Number of teardowns that skipped acknowledgement.
    pub fn discards(&self) -> usize {
        self.state.lock().unwrap().discards
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// Scripted polls not yet consumed.
    pub fn remaining(&self) -> usize {
        self.state.lock().unwrap().script.len()
    }
}

impl ChangeSource for MockSource {
    fn connect(&mut self) -> impl Future<Output = PgResult<()>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();

            if state.fail_connects > 0 {
                state.fail_connects -= 1;
                return Err(PgError::Connection("connection refused".to_string()));
            }

            if !state.connected {
                state.connected = true;
                state.connects += 1;
            }
            Ok(())
        }
    }

    fn is_stream_open(&self) -> bool {
        self.state.lock().unwrap().stream_open
    }

    fn open_stream(&mut self, start: Option<Lsn>) -> impl Future<Output = PgResult<()>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();

            if !state.connected {
                return Err(PgError::NotConnected);
            }
            if state.stream_open {
                return Ok(());
            }

            state.opens.push(start);
            state.stream_open = true;
            state.position = start;
            Ok(())
        }
    }

    fn poll(&mut self) -> impl Future<Output = PgResult<Option<ChangeRow>>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();

            if !state.stream_open {
                return Err(PgError::Stream("stream is not open".to_string()));
            }

            match state.script.pop_front() {
                Some(MockPoll::Row(row)) => {
                    state.position = state.position.max(Some(row.lsn));
                    Ok(Some(row))
                }
                Some(MockPoll::Fail(message)) => Err(PgError::Stream(message)),
                Some(MockPoll::Empty) | None => Ok(None),
            }
        }
    }

    fn position(&self) -> Option<Lsn> {
        self.state.lock().unwrap().position
    }

    fn close(&mut self) -> impl Future<Output = Vec<PgError>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();

            state.stream_open = false;
            state.connected = false;
            state.closes += 1;
            state
                .close_errors
                .drain(..)
                .map(PgError::Stream)
                .collect()
        }
    }

    fn discard(&mut self) -> impl Future<Output = Vec<PgError>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();

            state.stream_open = false;
            state.connected = false;
            state.discards += 1;
            Vec::new()
        }
    }

    fn slot(&self) -> &str {
        &self.slot
    }
}
