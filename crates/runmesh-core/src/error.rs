use thiserror::Error;

/// Result type local to runmesh-core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad node config, action settings, or script content.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Report kind declaration or a report that does not fit it.
    #[error("schema error: {0}")]
    Schema(String),

    /// Malformed execution plan (duplicate names, dangling edges, cycles).
    #[error("execution plan error: {0}")]
    Plan(String),

    #[error("encoding error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
