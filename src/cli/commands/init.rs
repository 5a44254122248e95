//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use super::{EXIT_CONFIG_ERROR, EXIT_FATAL};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "chunkwise.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        if Path::new(&self.output).exists() && !self.force {
            println!("Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(EXIT_CONFIG_ERROR);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Point [source] and [sink] at your files");
                println!("  2. Validate configuration: chunkwise validate-config");
                println!("  3. Run the step: chunkwise run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("Failed to write configuration file");
                println!("   Error: {e}");
                Ok(EXIT_FATAL)
            }
        }
    }

    fn generate_minimal_config() -> String {
        r#"# Chunkwise Configuration File

[application]
log_level = "info"

[step]
name = "copy-lines"
chunk_size = 100
fault_tolerant = true

[step.retry]
max_attempts = 3
retryable = ["write"]

[step.skip]
limit = 10
skippable = ["read", "process", "write"]

[source]
path = "input.txt"
processor = "identity"

[sink]
path = "output.txt"

[state]
enable_checkpointing = true
checkpoint_path = ".chunkwise/state"

[logging]
local_enabled = false
console_format = "text"
"#
        .to_string()
    }

    fn generate_config_with_examples() -> String {
        r#"# Chunkwise Configuration File
#
# Values may reference environment variables with ${VAR}. Most settings can
# also be overridden with a CHUNKWISE_<SECTION>_<KEY> variable, for example
# CHUNKWISE_STEP_CHUNK_SIZE=500.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# ============================================================================
# Step Settings
# ============================================================================
[step]
# Step name; checkpoints are stored per step name
name = "copy-lines"

# Items per transaction
chunk_size = 100

# Enable retry and skip handling
fault_tolerant = true

# Keep read items in memory across rollbacks. When false, the reader is
# rewound and items are read again after every rollback.
buffering = true

# Parallel process workers (1-256)
concurrency = 1

# How a failed write is traced to its item:
# - item_by_item: write each item alone in its own transaction
# - bisect: halve the failing range until the item is isolated
scan_mode = "item_by_item"

# Retry state kept per item (bounded)
retry_cache_capacity = 4096

[step.retry]
# Attempts per item, the first one included
max_attempts = 3

# Back-off between attempts; 0 disables it
initial_delay_ms = 100
max_delay_ms = 5000
backoff_multiplier = 2.0
jitter = false

# Error kinds worth retrying (read, process, write, transaction, io, serialization, other)
retryable = ["write"]

[step.skip]
# Maximum skipped items over the whole step
limit = 10

# Error kinds that may be skipped
skippable = ["read", "process", "write"]

# ============================================================================
# Transaction Settings
# ============================================================================
[transaction]
# 0 means no timeout
timeout_seconds = 0

# default, read_committed, repeatable_read, serializable
isolation = "default"

# ============================================================================
# Source and Sink
# ============================================================================
[source]
# Line-oriented input file
path = "${CHUNKWISE_INPUT}"

# identity, uppercase, trim or skip-blank
processor = "trim"

[sink]
# Line-oriented output file, truncated to the last checkpoint on restart
path = "output.txt"

# ============================================================================
# Checkpoints
# ============================================================================
[state]
enable_checkpointing = true
checkpoint_path = ".chunkwise/state"

# ============================================================================
# Logging
# ============================================================================
[logging]
# Write logs to files as well as the console
local_enabled = false
local_path = "logs"

# daily, hourly or never
local_rotation = "daily"

# text or json
console_format = "text"
"#
        .to_string()
    }
}
