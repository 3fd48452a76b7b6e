use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use crate::domain::Task;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse task snapshot: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode task snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Durable home of the task snapshot. `load` yields an empty list when
/// nothing has been saved yet.
pub trait TaskStore {
    fn load(&self) -> Result<Vec<Task>, StorageError>;
    fn save(&mut self, tasks: &[Task]) -> Result<(), StorageError>;
}

pub fn encode_snapshot(tasks: &[Task]) -> Result<String, StorageError> {
    serde_json::to_string(tasks).map_err(StorageError::Encode)
}

pub fn decode_snapshot(raw: &str) -> Result<Vec<Task>, StorageError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(StorageError::Decode)
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TaskStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Task>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };

        decode_snapshot(&raw)
    }

    fn save(&mut self, tasks: &[Task]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoded = encode_snapshot(tasks)?;
        let mut file = fs::File::create(&self.path)?;
        file.write_all(encoded.as_bytes())?;
        tracing::debug!(path = %self.path.display(), tasks = tasks.len(), "saved snapshot");
        Ok(())
    }
}

/// In-memory store; clones share the same saved snapshot.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: std::rc::Rc<std::cell::RefCell<Option<String>>>,
    saves: std::rc::Rc<std::cell::Cell<usize>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_snapshot(raw: &str) -> Self {
        let store = Self::default();
        *store.saved.borrow_mut() = Some(raw.to_string());
        store
    }

    pub fn snapshot(&self) -> Option<String> {
        self.saved.borrow().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

#[cfg(test)]
impl TaskStore for MemoryStore {
    fn load(&self) -> Result<Vec<Task>, StorageError> {
        match self.saved.borrow().as_deref() {
            Some(raw) => decode_snapshot(raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&mut self, tasks: &[Task]) -> Result<(), StorageError> {
        *self.saved.borrow_mut() = Some(encode_snapshot(tasks)?);
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{JsonFileStore, StorageError, TaskStore, decode_snapshot, encode_snapshot};

    const SNAPSHOT: &str = r#"[{"id":1767258000000,"name":"Writing","timeSpent":5,"isRunning":false,"lastStart":1767258000123},{"id":1767258060000,"name":"Review","timeSpent":0,"isRunning":true,"lastStart":1767258060000}]"#;

    #[test]
    fn snapshot_round_trips_byte_for_byte() {
        let tasks = decode_snapshot(SNAPSHOT).expect("snapshot should decode");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "Writing");
        assert_eq!(tasks[0].last_start.timestamp_millis(), 1_767_258_000_123);
        assert!(tasks[1].is_running);

        let encoded = encode_snapshot(&tasks).expect("snapshot should encode");
        assert_eq!(encoded, SNAPSHOT);
    }

    #[test]
    fn file_store_round_trips_and_treats_missing_file_as_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("tasks.json");
        let mut store = JsonFileStore::new(&path);

        assert!(store.load().expect("missing file loads").is_empty());

        let tasks = decode_snapshot(SNAPSHOT).expect("snapshot should decode");
        store.save(&tasks).expect("save should succeed");
        assert_eq!(fs::read_to_string(&path).expect("file written"), SNAPSHOT);
        assert_eq!(store.load().expect("load should succeed"), tasks);
    }

    #[test]
    fn blank_file_loads_as_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tasks.json");
        fs::write(&path, "  \n").expect("write blank file");

        assert!(JsonFileStore::new(&path).load().expect("load").is_empty());
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{not json").expect("write corrupt file");

        let err = JsonFileStore::new(&path).load().expect_err("should fail");
        assert!(matches!(err, StorageError::Decode(_)));
    }
}
