use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("parse error at {pos}: {msg}")]
    Parse { pos: usize, msg: String },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("join error: {0}")]
    Join(String),

    #[error("invalid query: {0}")]
    Invalid(String),
}
