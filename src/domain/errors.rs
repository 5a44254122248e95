//! Domain error types
//!
//! This module defines the error hierarchy for chunkwise. Item-level failures
//! (`Read`, `Process`, `Write`) are resolved locally by skip and retry policies;
//! the fatal variants bypass that machinery entirely.

use thiserror::Error;

/// Main chunkwise error type
///
/// Errors are `Clone` because a single failure is shared between the retry
/// contexts of every item in a failed batch and re-raised by the chunk scan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BatchError {
    /// Failure reading an item from the source
    #[error("Read error: {0}")]
    Read(String),

    /// Failure transforming an item
    #[error("Process error: {0}")]
    Process(String),

    /// Failure writing a group of items to the sink
    #[error("Write error: {0}")]
    Write(String),

    /// A listener callback failed; always aborts the step
    #[error("Listener error: {0}")]
    Listener(String),

    /// Cooperative stop request observed at a chunk boundary
    #[error("Step interrupted: {0}")]
    Interrupted(String),

    /// Checkpoint persistence or commit failed; never retried
    #[error("Fatal commit error: {0}")]
    FatalCommit(String),

    /// Transaction begin/rollback failure
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Skip policy refused a skip because the limit was reached
    #[error("Skip limit of {limit} exceeded: {cause}")]
    SkipLimitExceeded { limit: usize, cause: Box<BatchError> },

    /// The bounded retry context cache is full
    #[error("Retry context cache capacity of {0} exceeded")]
    RetryCacheCapacityExceeded(usize),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O errors raised by adapters
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Coarse classification used by skip and retry policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Read,
    Process,
    Write,
    Listener,
    Interrupted,
    FatalCommit,
    Transaction,
    SkipLimitExceeded,
    RetryCacheCapacityExceeded,
    Configuration,
    Io,
    Serialization,
    Other,
}

impl BatchError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::Read(_) => ErrorKind::Read,
            BatchError::Process(_) => ErrorKind::Process,
            BatchError::Write(_) => ErrorKind::Write,
            BatchError::Listener(_) => ErrorKind::Listener,
            BatchError::Interrupted(_) => ErrorKind::Interrupted,
            BatchError::FatalCommit(_) => ErrorKind::FatalCommit,
            BatchError::Transaction(_) => ErrorKind::Transaction,
            BatchError::SkipLimitExceeded { .. } => ErrorKind::SkipLimitExceeded,
            BatchError::RetryCacheCapacityExceeded(_) => ErrorKind::RetryCacheCapacityExceeded,
            BatchError::Configuration(_) => ErrorKind::Configuration,
            BatchError::Io(_) => ErrorKind::Io,
            BatchError::Serialization(_) => ErrorKind::Serialization,
            BatchError::Other(_) => ErrorKind::Other,
        }
    }

    /// Errors that must never be skipped or retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BatchError::Listener(_)
                | BatchError::FatalCommit(_)
                | BatchError::Interrupted(_)
                | BatchError::SkipLimitExceeded { .. }
                | BatchError::RetryCacheCapacityExceeded(_)
        )
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(ErrorKind::Read),
            "process" => Ok(ErrorKind::Process),
            "write" => Ok(ErrorKind::Write),
            "transaction" => Ok(ErrorKind::Transaction),
            "io" => Ok(ErrorKind::Io),
            "serialization" => Ok(ErrorKind::Serialization),
            "other" => Ok(ErrorKind::Other),
            _ => Err(BatchError::Configuration(format!(
                "Unknown or non-classifiable error kind '{s}'. Must be one of: read, process, write, transaction, io, serialization, other"
            ))),
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for BatchError {
    fn from(err: std::io::Error) -> Self {
        BatchError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for BatchError {
    fn from(err: toml::de::Error) -> Self {
        BatchError::Configuration(format!("TOML parse error: {err}"))
    }
}
