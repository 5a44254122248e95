//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Console output in text or JSON format
//! - Configurable log levels with `RUST_LOG` style directives
//! - Local file logging with daily rotation
//!
//! # Example
//!
//! ```no_run
//! use chunkwise::logging::init_logging;
//! use chunkwise::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};

/// Log a committed chunk
///
/// # Example
///
/// ```no_run
/// use chunkwise::log_chunk_commit;
///
/// log_chunk_commit!("import-orders", 12, 100, 98, 2);
/// ```
#[macro_export]
macro_rules! log_chunk_commit {
    ($step:expr, $commit:expr, $read:expr, $written:expr, $skipped:expr) => {
        tracing::debug!(
            step = %$step,
            commit = $commit,
            read = $read,
            written = $written,
            skipped = $skipped,
            "Chunk committed"
        );
    };
}

/// Log a skipped item
///
/// # Example
///
/// ```no_run
/// use chunkwise::log_skip;
/// use chunkwise::domain::BatchError;
///
/// let error = BatchError::Write("constraint violation".to_string());
/// log_skip!("write", &error, 1);
/// ```
#[macro_export]
macro_rules! log_skip {
    ($phase:expr, $error:expr, $skip_count:expr) => {
        tracing::warn!(
            phase = $phase,
            error = %$error,
            skip_count = $skip_count,
            "Skipping item"
        );
    };
}

/// Log a retry attempt of a batched operation
///
/// # Example
///
/// ```no_run
/// use chunkwise::log_retry_attempt;
/// use chunkwise::domain::BatchError;
///
/// let error = BatchError::Write("deadlock detected".to_string());
/// log_retry_attempt!(10, 2, 3, 500, &error);
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($keys:expr, $attempt:expr, $max_attempts:expr, $delay_ms:expr, $error:expr) => {
        tracing::warn!(
            keys = $keys,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            error = %$error,
            "Attempt failed, chunk will be retried"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use chunkwise::log_error_with_context;
/// use chunkwise::domain::BatchError;
///
/// let error = BatchError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
