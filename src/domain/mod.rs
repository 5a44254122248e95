//! Domain models and types for chunkwise.
//!
//! The domain layer provides:
//! - **Identifiers** ([`StepName`], [`ItemKey`])
//! - **Execution model** ([`StepExecution`], [`StepContribution`], [`ExecutionContext`], [`BatchStatus`])
//! - **Error types** ([`BatchError`], [`ErrorKind`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, BatchError>`]:
//!
//! ```rust
//! use chunkwise::domain::{BatchError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(BatchError::Process("price must be positive".to_string()))
//! }
//! ```

pub mod errors;
pub mod execution;
pub mod ids;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{BatchError, ErrorKind};
pub use execution::{BatchStatus, ExecutionContext, StepContribution, StepExecution};
pub use ids::{ItemKey, StepName};
pub use result::Result;
