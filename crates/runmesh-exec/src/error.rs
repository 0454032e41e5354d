use thiserror::Error;

use runmesh_core::id::RunId;
use runmesh_repo::RepoError;
use runmesh_store::StoreError;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("no active session for run {0}")]
    SessionNotFound(RunId),

    #[error("cannot create action '{name}' of type '{action_type}': {reason}")]
    ActionCreation {
        name: String,
        action_type: String,
        reason: String,
    },

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("no workspace for run {0}")]
    WorkspaceNotFound(RunId),

    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("collection of system '{system}' failed: {reason}")]
    Collection { system: String, reason: String },

    #[error("event bus error: {0}")]
    Bus(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Workspace(e.to_string())
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Workspace(e.to_string())
    }
}

/// Error returned by pluggable action, collector, and data source code.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Exec(#[from] Box<ExecError>),
}

impl ActionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ActionError::Failed(msg.into())
    }
}

impl From<runmesh_core::error::Error> for ActionError {
    fn from(e: runmesh_core::error::Error) -> Self {
        ActionError::Config(e.to_string())
    }
}

impl From<ExecError> for ActionError {
    fn from(e: ExecError) -> Self {
        ActionError::Exec(Box::new(e))
    }
}
