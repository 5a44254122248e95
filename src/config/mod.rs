//! Configuration management
//!
//! TOML configuration with `${VAR_NAME}` substitution, `CHUNKWISE_*`
//! environment overrides and validation on load.
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [step]
//! name = "orders"
//! chunk_size = 100
//! fault_tolerant = true
//!
//! [step.retry]
//! max_attempts = 3
//! retryable = ["write"]
//!
//! [step.skip]
//! limit = 10
//! skippable = ["read", "process", "write"]
//!
//! [source]
//! path = "${DATA_DIR}/orders.txt"
//! processor = "trim"
//!
//! [sink]
//! path = "${DATA_DIR}/orders.out"
//! ```
//!
//! # Validation
//!
//! ```rust,no_run
//! use chunkwise::config::load_config;
//!
//! # fn example() {
//! match load_config("chunkwise.toml") {
//!     Ok(config) => println!("Step {} is valid", config.step.name),
//!     Err(e) => eprintln!("Configuration error: {}", e),
//! }
//! # }
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, ChunkwiseConfig, LoggingConfig, RetryConfig, SinkConfig, SkipConfig,
    SourceConfig, StateConfig, StepConfig, TransactionConfig,
};
