use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StoreError;

pub const USERS_KEY: &str = "users";
pub const CURRENT_USER_KEY: &str = "currentUser";
pub const TODOS_KEY: &str = "todos";
pub const COMPLETED_KEY: &str = "completed";
pub const DELETED_KEY: &str = "deleted";
pub const THEME_KEY: &str = "theme";

/// Injected persistence capability: opaque get/set by string key, no
/// transactional guarantees. Both stores in this crate are written against
/// this trait so tests can swap in [`MemoryStore`].
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One file per key under a data directory. Writes go through a temp file in
/// the same directory and are persisted with a rename, so a crashed write
/// never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Unavailable {
            key: data_dir.display().to_string(),
            source,
        })?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.data"))
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.key_path(key);
        if !path.exists() {
            debug!(key, "key not present");
            return Ok(None);
        }

        let raw = fs::read_to_string(&path).map_err(|source| StoreError::Unavailable {
            key: key.to_string(),
            source,
        })?;
        debug!(key, bytes = raw.len(), "read key");
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.key_path(key);
        let unavailable = |source: std::io::Error| StoreError::Unavailable {
            key: key.to_string(),
            source,
        };

        let mut temp = NamedTempFile::new_in(&self.data_dir).map_err(unavailable)?;
        temp.write_all(value.as_bytes()).map_err(unavailable)?;
        temp.flush().map_err(unavailable)?;
        temp.persist(&path)
            .map_err(|err| unavailable(err.error))?;

        debug!(key, bytes = value.len(), file = %path.display(), "wrote key");
        Ok(())
    }
}

/// In-memory fake for tests. The mutex only guards the map against the test
/// harness running assertions from helper threads; there is no external
/// writer in the model.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrips_a_key() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");

        assert!(store.get("todos").expect("get").is_none());
        store.set("todos", "[]").expect("set");
        assert_eq!(store.get("todos").expect("get").as_deref(), Some("[]"));
    }

    #[test]
    fn file_store_overwrites_atomically() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");

        store.set("theme", "light").expect("set");
        store.set("theme", "dark").expect("set again");
        assert_eq!(store.get("theme").expect("get").as_deref(), Some("dark"));
    }

    #[test]
    fn memory_store_is_isolated_per_instance() {
        let a = MemoryStore::new();
        let b = MemoryStore::new();
        a.set("users", "[]").expect("set");
        assert!(b.get("users").expect("get").is_none());
    }
}
