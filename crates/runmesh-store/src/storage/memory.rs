//! In-memory storage backend.
//!
//! Backs `memory://` stores and tests. Availability can be toggled to
//! exercise the paths that must survive an unreachable store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StoreError};
use crate::storage::Storage;

/// Thread-safe in-memory storage. Clones share the same data.
#[derive(Clone)]
pub struct MemoryStorage {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    available: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the store going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        self.data
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.lock()?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete() {
        let storage = MemoryStorage::new();
        storage.write("test/file", b"hello").unwrap();
        assert_eq!(storage.read("test/file").unwrap(), Some(b"hello".to_vec()));
        assert!(storage.exists("test/file").unwrap());

        storage.delete("test/file").unwrap();
        assert_eq!(storage.read("test/file").unwrap(), None);
        storage.delete("test/file").unwrap();
    }

    #[test]
    fn list_is_sorted_and_prefix_bounded() {
        let storage = MemoryStorage::new();
        storage.write("dir/b", b"2").unwrap();
        storage.write("dir/a", b"1").unwrap();
        storage.write("dirx/c", b"3").unwrap();
        storage.write("other/d", b"4").unwrap();

        assert_eq!(storage.list("dir/").unwrap(), vec!["dir/a", "dir/b"]);
        assert_eq!(storage.delete_prefix("dir").unwrap(), 3);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn offline_store_fails_every_call() {
        let storage = MemoryStorage::new();
        storage.write("k", b"v").unwrap();
        storage.set_available(false);
        assert!(matches!(storage.read("k"), Err(StoreError::Unavailable(_))));
        assert!(matches!(storage.list(""), Err(StoreError::Unavailable(_))));
        storage.set_available(true);
        assert!(storage.read("k").unwrap().is_some());
    }
}
