//! Filesystem storage rooted at a directory.
//!
//! Keys map to relative paths under the root. Writes go to a hidden temp file
//! first and are renamed into place, so readers on other nodes sharing the
//! directory never observe a torn value.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StoreError};
use crate::storage::Storage;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (and create if needed) a store under `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StoreError::Unavailable(format!("cannot create store root {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }
}

impl Storage for FsStorage {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let p = self.path_of(key);
        let parent = p
            .parent()
            .ok_or_else(|| StoreError::Config(format!("invalid key '{key}'")))?;
        fs::create_dir_all(parent)?;

        let name = p
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::Config(format!("invalid key '{key}'")))?;
        let tmp = parent.join(format!(
            ".{}.tmp{}-{}",
            name,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(bytes)?;
            f.flush()?;
        }
        fs::rename(&tmp, &p)?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_of(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only walk the deepest directory the prefix pins down.
        let dir_part = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = self.path_of(dir_part);
        let mut results = Vec::new();
        if !start.is_dir() {
            return Ok(results);
        }

        fn visit(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(true, |n| n.starts_with('.'));
                if hidden {
                    continue;
                }
                if path.is_dir() {
                    visit(&path, out)?;
                } else {
                    out.push(path);
                }
            }
            Ok(())
        }

        let mut paths = Vec::new();
        visit(&start, &mut paths)?;
        for p in paths {
            if let Some(k) = self.key_of(&p) {
                if k.starts_with(prefix) {
                    results.push(k);
                }
            }
        }
        results.sort();
        Ok(results)
    }
}
