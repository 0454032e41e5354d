use thiserror::Error;

use runmesh_core::id::RunId;
use runmesh_query::QueryError;
use runmesh_store::StoreError;

pub type Result<T> = std::result::Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("report kind '{kind}' is not declared for run {run_id}")]
    ReportKindNotFound { run_id: RunId, kind: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("export failed: {0}")]
    Export(String),
}

impl From<StoreError> for RepoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => RepoError::StoreUnavailable(msg),
            StoreError::Query(q) => RepoError::Query(q),
            StoreError::Schema(msg) => RepoError::Schema(msg),
            other => RepoError::Store(other),
        }
    }
}

impl From<runmesh_core::error::Error> for RepoError {
    fn from(e: runmesh_core::error::Error) -> Self {
        RepoError::Schema(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Store(StoreError::Codec(e.to_string()))
    }
}
