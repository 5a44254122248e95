//! CLI command implementations
//!
//! Exit codes shared by the commands:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Completed |
//! | 1 | Stopped by a shutdown signal |
//! | 2 | Configuration error |
//! | 3 | Step failed |
//! | 4 | Outcome unknown (commit failed) |
//! | 5 | Fatal error |

pub mod init;
pub mod run;
pub mod status;
pub mod validate;

use crate::domain::BatchStatus;

pub const EXIT_CONFIG_ERROR: i32 = 2;
pub const EXIT_FATAL: i32 = 5;

/// Process exit code for a finished step
pub fn exit_code(status: BatchStatus) -> i32 {
    match status {
        BatchStatus::Completed => 0,
        BatchStatus::Stopped => 1,
        BatchStatus::Failed => 3,
        BatchStatus::Unknown => 4,
        BatchStatus::Starting | BatchStatus::Started => EXIT_FATAL,
    }
}
