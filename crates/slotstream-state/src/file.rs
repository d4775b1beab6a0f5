use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use slotstream_core::Lsn;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::CheckpointStore;

/// Stores the position as a single text line (`X/Y`) in a file.
///
/// Without a path the store is disabled: `load` returns `None` and `save` is
/// a no-op.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: Option<PathBuf>,
}

impl FileCheckpointStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::new(Some(path.into()))
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn io_error(path: &Path, source: std::io::Error) -> StateError {
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> StateResult<Option<Lsn>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No checkpoint file");
                return Ok(None);
            }
            Err(e) => return Err(Self::io_error(path, e)),
        };

        let line = content.lines().next().unwrap_or("").trim();
        let lsn = line.parse::<Lsn>().map_err(|e| StateError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!(path = %path.display(), lsn = %lsn, "Loaded checkpoint");
        Ok(Some(lsn))
    }

    fn save(&self, lsn: Lsn) -> StateResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Readers never see a partial line: write a sibling, then rename.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).map_err(|e| Self::io_error(&tmp, e))?;
        writeln!(file, "{}", lsn).map_err(|e| Self::io_error(&tmp, e))?;
        file.sync_all().map_err(|e| Self::io_error(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, path).map_err(|e| Self::io_error(path, e))?;

        debug!(path = %path.display(), lsn = %lsn, "Saved checkpoint");
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<disabled>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::at(dir.path().join("lsn.txt"));

        for lsn in [Lsn(0), Lsn(0x16B3748), Lsn(0x1_0000_0000 + 0x16B3748), Lsn(u64::MAX)] {
            store.save(lsn).unwrap();
            assert_eq!(store.load().unwrap(), Some(lsn));
        }
    }

    #[test]
    fn test_file_format_is_single_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lsn.txt");
        let store = FileCheckpointStore::at(&path);

        store.save(Lsn(0x16B3748)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0/16B3748\n");
        assert!(!dir.path().join("lsn.txt.tmp").exists());
    }

    #[test]
    fn test_reads_hand_written_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lsn.txt");
        fs::write(&path, "16/B374D848\r\nignored second line\n").unwrap();

        let store = FileCheckpointStore::at(&path);
        assert_eq!(store.load().unwrap(), Some("16/B374D848".parse().unwrap()));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::at(dir.path().join("absent.txt"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_disabled_store() {
        let store = FileCheckpointStore::disabled();
        assert_eq!(store.load().unwrap(), None);
        store.save(Lsn(42)).unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.describe(), "<disabled>");
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lsn.txt");

        for content in ["not an lsn\n", "", "\n"] {
            fs::write(&path, content).unwrap();
            let result = FileCheckpointStore::at(&path).load();
            assert!(matches!(result, Err(StateError::Corrupt { .. })), "{:?}", content);
        }
    }

    #[test]
    fn test_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::at(dir.path().join("missing_dir").join("lsn.txt"));

        let result = store.save(Lsn(1));
        assert!(matches!(result, Err(StateError::Io { .. })));
    }
}
