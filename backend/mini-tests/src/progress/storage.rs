use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const STUDENT_KEY: &str = "mini-tests:student";
pub const PROGRESS_KEY: &str = "mini-tests:progress";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("storage encoding failed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable string key/value storage, the browser's `localStorage` contract.
pub trait KeyValueStorage: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// All keys in one JSON object on disk, rewritten on every mutation.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    /// Opens `path`. A missing file starts empty; so does an unreadable one,
    /// with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "storage file is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "storage file unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("mini-tests-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_memory_storage_get_set_remove() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get(STUDENT_KEY), None);
        storage.set(STUDENT_KEY, "12345".to_string()).unwrap();
        assert_eq!(storage.get(STUDENT_KEY).as_deref(), Some("12345"));
        storage.remove(STUDENT_KEY).unwrap();
        assert_eq!(storage.get(STUDENT_KEY), None);
    }

    #[test]
    fn test_file_storage_persists_across_opens() {
        let path = temp_path("storage.json");
        let mut storage = FileStorage::open(&path);
        storage.set(PROGRESS_KEY, "{}".to_string()).unwrap();
        storage.set(STUDENT_KEY, "54321".to_string()).unwrap();
        storage.remove(PROGRESS_KEY).unwrap();

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get(STUDENT_KEY).as_deref(), Some("54321"));
        assert_eq!(reopened.get(PROGRESS_KEY), None);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_storage_recovers_from_garbage() {
        let path = temp_path("storage.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();
        let storage = FileStorage::open(&path);
        assert_eq!(storage.get(STUDENT_KEY), None);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
