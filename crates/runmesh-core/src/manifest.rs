//! Outcome record of one action run, for logs and the CLI.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::id::{InstanceId, RunId};

/// Milliseconds since Unix epoch (UTC).
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionManifest {
    pub run_id: RunId,
    pub action: String,
    pub instance_id: InstanceId,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,

    /// Whether `execute` returned without error.
    pub succeeded: bool,
    /// Completion signals that went through collection.
    pub collected: usize,
    /// Collections that ended in an error verdict or a hook failure.
    pub failed_collections: usize,
    /// Whether a stop was requested while the action ran.
    pub cancelled: bool,
    /// Error raised by `execute`, if any.
    pub error: Option<String>,

    pub engine_version: String,
}

impl ActionManifest {
    pub fn new(run_id: RunId, action: impl Into<String>, instance_id: InstanceId, started_ms: u64) -> Self {
        Self {
            run_id,
            action: action.into(),
            instance_id,
            started_ms,
            finished_ms: started_ms,
            succeeded: false,
            collected: 0,
            failed_collections: 0,
            cancelled: false,
            error: None,
            engine_version: crate::VERSION.to_string(),
        }
    }

    pub fn finish(mut self, finished_ms: u64) -> Self {
        self.finished_ms = finished_ms;
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}
