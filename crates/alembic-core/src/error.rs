use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlembicError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Key shape mismatch: {0}")]
    KeyShape(String),

    #[error("Conditional check failed on table '{0}'")]
    ConditionFailed(String),

    #[error("Store returned no response section for table '{table}'")]
    BatchResponseMissing { table: String },

    #[error("Dependency shape mismatch: expected {expected}, got {got}")]
    DependencyShape { expected: String, got: String },

    #[error("Event does not match this trigger: {0}")]
    EventMismatch(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for AlembicError {
    fn from(e: serde_json::Error) -> Self {
        AlembicError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlembicError>;

// Custom Error Types:
//
// Any error implementing `std::error::Error + Send + Sync + 'static` can be
// converted to `AlembicError::Other` through anyhow. For better control,
// implement `From<YourError> for AlembicError` directly.
