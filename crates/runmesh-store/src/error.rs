use thiserror::Error;

use runmesh_query::QueryError;

/// Result type local to runmesh-store.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached. Surfaced to callers, never retried here.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("row does not match table: {0}")]
    Schema(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}
