//! Per-run file roots.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use runmesh_core::id::RunId;
use runmesh_core::request::ActionRequest;
use runmesh_store::path;

use crate::error::{ExecError, Result};

const REQUEST_FILE: &str = "request.json";

/// File root of one run on this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    run_id: RunId,
    root: PathBuf,
}

impl Workspace {
    pub fn new(run_id: RunId, root: impl Into<PathBuf>) -> Self {
        Self {
            run_id,
            root: root.into(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name` under the root; nothing is created.
    pub fn file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root.join(name)
    }

    /// Directory `name` under the root, created if missing.
    pub fn directory(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn write_json<T: Serialize>(&self, name: impl AsRef<Path>, value: &T) -> Result<PathBuf> {
        let file = self.file(name);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file, serde_json::to_vec_pretty(value)?)?;
        Ok(file)
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: impl AsRef<Path>) -> Result<T> {
        let bytes = std::fs::read(self.file(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Allocate (or reopen) the workspace for the request's run.
    async fn create(&self, request: &ActionRequest) -> Result<Workspace>;

    /// Open an existing workspace; `WorkspaceNotFound` when the run has none.
    async fn load(&self, run_id: &RunId) -> Result<Workspace>;
}

/// Workspaces as directories `<root>/<run>/` on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsWorkspaceProvider {
    root: PathBuf,
}

impl FsWorkspaceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir_for(&self, run_id: &RunId) -> PathBuf {
        self.root.join(path::segment(run_id.as_str()))
    }
}

#[async_trait]
impl WorkspaceProvider for FsWorkspaceProvider {
    async fn create(&self, request: &ActionRequest) -> Result<Workspace> {
        let dir = self.dir_for(&request.run_id);
        tokio::fs::create_dir_all(&dir).await?;
        let bytes = serde_json::to_vec_pretty(request)?;
        tokio::fs::write(dir.join(REQUEST_FILE), bytes).await?;
        debug!(run_id = %request.run_id, root = %dir.display(), "workspace created");
        Ok(Workspace::new(request.run_id.clone(), dir))
    }

    async fn load(&self, run_id: &RunId) -> Result<Workspace> {
        let dir = self.dir_for(run_id);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Workspace::new(run_id.clone(), dir)),
            Ok(_) => Err(ExecError::WorkspaceNotFound(run_id.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExecError::WorkspaceNotFound(run_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmesh_core::id::WorkerNodeId;

    #[tokio::test]
    async fn create_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FsWorkspaceProvider::new(dir.path());
        let req = ActionRequest::new(RunId::new("run/1"), "crawl", "Crawl", WorkerNodeId::new("n1"));

        let ws = provider.create(&req).await.unwrap();
        assert!(ws.root().starts_with(dir.path()));
        let stored: ActionRequest = ws.read_json(REQUEST_FILE).unwrap();
        assert_eq!(stored.action_name, "crawl");

        let again = provider.load(&RunId::new("run/1")).await.unwrap();
        assert_eq!(again, ws);
    }

    #[tokio::test]
    async fn load_unknown_run() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FsWorkspaceProvider::new(dir.path());
        assert!(matches!(
            provider.load(&RunId::new("ghost")).await,
            Err(ExecError::WorkspaceNotFound(_))
        ));
    }

    #[test]
    fn files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(RunId::new("r"), dir.path());
        let out = ws.directory("exports/csv").unwrap();
        assert!(out.is_dir());
        let written = ws.write_json("manifests/a.json", &serde_json::json!({"ok": true})).unwrap();
        assert_eq!(written, ws.file("manifests/a.json"));
        let back: serde_json::Value = ws.read_json("manifests/a.json").unwrap();
        assert_eq!(back["ok"], true);
    }
}
