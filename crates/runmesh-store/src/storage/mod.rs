//! Storage adapters.
//!
//! - `memory`: in-process map, used for `memory://` and in tests.
//! - `fs`: local or shared filesystem rooted at a directory (default).
//!
//! All backends are synchronous and safe to share across tasks; callers wrap
//! them in `Arc<dyn Storage>`.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;

use runmesh_core::config::StorageConfig;

use crate::error::{Result, StoreError};

/// Flat key/value store with prefix listing. Writes are whole-value upserts
/// (last writer wins); there is no compare-and-swap.
pub trait Storage: Send + Sync {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// `Ok(None)` when the key does not exist.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Every key starting with `prefix`, sorted ascending.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.read(key)?.is_some())
    }

    /// Delete every key under `prefix`; returns how many were removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list(prefix)?;
        for k in &keys {
            self.delete(k)?;
        }
        Ok(keys.len())
    }
}

/// Build the correct storage backend using the provided configuration.
pub fn build_storage_from_config(cfg: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match cfg.scheme() {
        Some("memory") | Some("mem") => Ok(Arc::new(MemoryStorage::new())),
        Some("file") | None => {
            if cfg.root.trim().is_empty() {
                return Err(StoreError::Config("filesystem store needs a root directory".into()));
            }
            Ok(Arc::new(FsStorage::new(&cfg.root)?))
        }
        Some(other) => Err(StoreError::Config(format!("unsupported store scheme '{other}'"))),
    }
}
