//! Node configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity of this worker node in the cluster.
    pub worker_node_id: String,

    /// Root directory under which per-run workspaces are created.
    pub workspace_root: String,

    /// Optional fully-qualified store URI (`memory://`, `file:///var/runmesh`).
    pub store_uri: Option<String>,

    /// Store directory used when no URI is configured.
    pub store_dir: String,

    /// Upper bound on concurrently running per-system collections.
    pub collector_threads: usize,

    /// How long `close()` waits for outstanding collections, in milliseconds.
    pub close_timeout_ms: u64,

    /// Buffer size of the session event bus.
    pub event_bus_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            worker_node_id: "local".to_string(),
            workspace_root: "/tmp/runmesh-workspace".to_string(),
            store_uri: None,
            store_dir: "/tmp/runmesh-store".to_string(),
            collector_threads: default_collector_threads(),
            close_timeout_ms: 2 * 60 * 60 * 1000, // two hours
            event_bus_capacity: 1024,
        }
    }
}

/// One less than the available cores, at least one.
fn default_collector_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub uri: Option<String>,
    pub root: String,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            uri: Some("memory://".to_string()),
            root: String::new(),
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.uri
            .as_deref()
            .and_then(|uri| uri.split("://").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

impl NodeConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RUNMESH_WORKER_NODE_ID`: node identity
    /// - `RUNMESH_WORKSPACE_ROOT`: workspace root directory
    /// - `RUNMESH_STORE_URI`: store URI (`memory://`, `file:///path`)
    /// - `RUNMESH_STORE_DIR`: store directory when no URI is set
    /// - `RUNMESH_COLLECTOR_THREADS`: concurrent collections
    /// - `RUNMESH_CLOSE_TIMEOUT_MS`: close drain timeout
    /// - `RUNMESH_EVENT_BUS_CAPACITY`: event bus buffer
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("RUNMESH_WORKER_NODE_ID") {
            cfg.worker_node_id = s;
        }

        if let Ok(s) = std::env::var("RUNMESH_WORKSPACE_ROOT") {
            cfg.workspace_root = s;
        }

        if let Ok(s) = std::env::var("RUNMESH_STORE_URI") {
            cfg.store_uri = Some(s);
        }

        if let Ok(s) = std::env::var("RUNMESH_STORE_DIR") {
            cfg.store_dir = s;
        }

        if let Ok(s) = std::env::var("RUNMESH_COLLECTOR_THREADS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.collector_threads = v.max(1);
            }
        }

        if let Ok(s) = std::env::var("RUNMESH_CLOSE_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.close_timeout_ms = v;
            }
        }

        if let Ok(s) = std::env::var("RUNMESH_EVENT_BUS_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.event_bus_capacity = v.max(1);
            }
        }

        cfg
    }

    /// Produce a storage configuration snapshot used by the store layer.
    pub fn storage_config(&self) -> StorageConfig {
        let scheme = self
            .store_uri
            .as_deref()
            .and_then(|uri| uri.split("://").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());

        let root = match (scheme, self.store_uri.as_ref()) {
            (Some("file"), Some(uri)) => {
                file_uri_to_path(uri).unwrap_or_else(|| self.store_dir.clone())
            }
            (Some(_), Some(uri)) => uri.trim_end_matches('/').to_string(),
            _ => self.store_dir.clone(),
        };

        StorageConfig {
            uri: self.store_uri.clone(),
            root,
        }
    }
}

fn file_uri_to_path(uri: &str) -> Option<String> {
    let stripped = uri.strip_prefix("file://")?;
    if stripped.starts_with('/') {
        Some(stripped.to_string())
    } else {
        Some(format!("/{}", stripped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_config_resolves_file_uris() {
        let cfg = NodeConfig {
            store_uri: Some("file:///var/runmesh".into()),
            ..NodeConfig::default()
        };
        let sc = cfg.storage_config();
        assert_eq!(sc.scheme(), Some("file"));
        assert_eq!(sc.root, "/var/runmesh");
    }

    #[test]
    fn storage_config_falls_back_to_dir() {
        let cfg = NodeConfig {
            store_dir: "/data/store".into(),
            ..NodeConfig::default()
        };
        let sc = cfg.storage_config();
        assert_eq!(sc.scheme(), None);
        assert_eq!(sc.root, "/data/store");
        assert_eq!(StorageConfig::memory().scheme(), Some("memory"));
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = NodeConfig::default();
        assert!(cfg.collector_threads >= 1);
        assert_eq!(cfg.close_timeout_ms, 7_200_000);
        assert_eq!(cfg.event_bus_capacity, 1024);
    }
}
