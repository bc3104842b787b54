use thiserror::Error;

/// Strata error types
#[derive(Error, Debug)]
pub enum StrataError {
    /// Unknown snapshot key, name, or id
    #[error("not found: {0}")]
    NotFound(String),

    /// Key collision on create or commit
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Malformed request (empty key, unknown field path, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the snapshot's current state
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Metadata transaction could not be opened, committed, or rolled back
    #[error("transaction failed during {op}: {message}")]
    TransactionFailed { op: String, message: String },

    /// Parent contents could not be materialized into a staging directory
    #[error("copy failed for {path}: {message}")]
    CopyFailed { path: String, message: String },

    /// Union mount bridge is not active at the expected root
    #[error("mount unavailable at {root}: {message}")]
    MountUnavailable { root: String, message: String },

    /// Metadata references a directory that does not exist on disk
    #[error("inconsistent state for snapshot {id}: {message}")]
    Inconsistent { id: String, message: String },

    /// Snapshot manager or metadata store has been closed
    #[error("snapshotter is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Build step executor error
    #[error("Executor error: {0}")]
    ExecutorError(String),

    /// Content store error
    #[error("Content error: {0}")]
    ContentError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl StrataError {
    /// Shorthand for a transaction failure tagged with the operation name.
    pub fn transaction(op: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StrataError::TransactionFailed {
            op: op.into(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StrataError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StrataError::AlreadyExists(_))
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for StrataError {
    fn from(err: serde_yaml::Error) -> Self {
        StrataError::SerializationError(err.to_string())
    }
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
