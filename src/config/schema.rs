//! Configuration schema types
//!
//! Maps `chunkwise.toml` section by section. Every section validates itself and
//! [`ChunkwiseConfig::validate`] runs them all.

use crate::core::processor::ScanMode;
use crate::domain::ErrorKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main configuration, the root of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkwiseConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Chunk step settings
    pub step: StepConfig,

    /// Transaction settings
    #[serde(default)]
    pub transaction: TransactionConfig,

    /// Input file and item processor
    pub source: SourceConfig,

    /// Output file
    pub sink: SinkConfig,

    /// Checkpoint storage
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChunkwiseConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.step.validate()?;
        self.transaction.validate()?;
        self.source.validate()?;
        self.sink.validate()?;
        self.state.validate()?;
        self.logging.validate()?;

        if self.source.path == self.sink.path {
            return Err("source.path and sink.path must differ".to_string());
        }
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Chunk step configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, also the checkpoint key
    pub name: String,

    /// Items per transaction
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Enable retry and skip handling
    #[serde(default)]
    pub fault_tolerant: bool,

    /// Keep the chunk in memory across rollbacks instead of re-reading it
    #[serde(default = "default_true")]
    pub buffering: bool,

    /// Worker tasks for the transform phase
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Scan strategy once write retries are exhausted
    #[serde(default = "default_scan_mode")]
    pub scan_mode: String,

    /// Maximum number of items with a live retry context
    #[serde(default = "default_retry_cache_capacity")]
    pub retry_cache_capacity: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub skip: SkipConfig,
}

impl StepConfig {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("step.name cannot be empty".to_string());
        }
        if self.chunk_size == 0 {
            return Err("step.chunk_size must be > 0".to_string());
        }
        if self.concurrency == 0 || self.concurrency > 256 {
            return Err("step.concurrency must be between 1 and 256".to_string());
        }
        if self.retry_cache_capacity == 0 {
            return Err("step.retry_cache_capacity must be > 0".to_string());
        }

        let scan_mode = self.scan_mode()?;
        if scan_mode == ScanMode::Bisect && self.concurrency > 1 {
            return Err("step.scan_mode = 'bisect' cannot be combined with concurrency > 1".to_string());
        }
        if scan_mode == ScanMode::Bisect && !self.buffering {
            return Err("step.scan_mode = 'bisect' requires buffering".to_string());
        }

        self.retry.validate()?;
        self.skip.validate()?;
        Ok(())
    }

    /// Parsed scan mode
    pub fn scan_mode(&self) -> Result<ScanMode, String> {
        ScanMode::from_str(&self.scan_mode)
    }
}

/// Retry configuration of a fault tolerant step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per item, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial back-off delay in milliseconds, 0 disables back-off
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum back-off delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add up to 10% random jitter to each delay
    #[serde(default)]
    pub jitter: bool,

    /// Error kinds that may be retried
    #[serde(default = "default_retryable")]
    pub retryable: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
            retryable: default_retryable(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("step.retry.max_attempts must be > 0".to_string());
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err("step.retry.initial_delay_ms must not exceed max_delay_ms".to_string());
        }
        if self.backoff_multiplier < 1.0 {
            return Err("step.retry.backoff_multiplier must be >= 1.0".to_string());
        }
        self.retryable_kinds()?;
        Ok(())
    }

    pub fn retryable_kinds(&self) -> Result<Vec<ErrorKind>, String> {
        parse_kinds("step.retry.retryable", &self.retryable)
    }
}

/// Skip configuration of a fault tolerant step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipConfig {
    /// Maximum skips across all phases of the step
    #[serde(default = "default_skip_limit")]
    pub limit: usize,

    /// Error kinds that may be skipped
    #[serde(default = "default_skippable")]
    pub skippable: Vec<String>,
}

impl Default for SkipConfig {
    fn default() -> Self {
        Self {
            limit: default_skip_limit(),
            skippable: default_skippable(),
        }
    }
}

impl SkipConfig {
    fn validate(&self) -> Result<(), String> {
        self.skippable_kinds()?;
        Ok(())
    }

    pub fn skippable_kinds(&self) -> Result<Vec<ErrorKind>, String> {
        parse_kinds("step.skip.skippable", &self.skippable)
    }
}

/// Transaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Transaction timeout in seconds, 0 for none
    #[serde(default)]
    pub timeout_seconds: u64,

    /// Isolation level hint passed to the transaction manager
    #[serde(default = "default_isolation")]
    pub isolation: String,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            isolation: default_isolation(),
        }
    }
}

impl TransactionConfig {
    fn validate(&self) -> Result<(), String> {
        crate::adapters::traits::IsolationLevel::from_str(&self.isolation)?;
        Ok(())
    }
}

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Line-oriented input file
    pub path: String,

    /// Built-in processor applied to every line
    #[serde(default = "default_processor")]
    pub processor: String,
}

impl SourceConfig {
    fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("source.path cannot be empty".to_string());
        }
        let valid = ["identity", "uppercase", "trim", "skip-blank"];
        if !valid.contains(&self.processor.as_str()) {
            return Err(format!(
                "Invalid source.processor '{}'. Must be one of: {}",
                self.processor,
                valid.join(", ")
            ));
        }
        Ok(())
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Line-oriented output file
    pub path: String,
}

impl SinkConfig {
    fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("sink.path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Persist progress after every commit
    #[serde(default = "default_true")]
    pub enable_checkpointing: bool,

    /// Directory holding one checkpoint file per step
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enable_checkpointing: true,
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

impl StateConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enable_checkpointing && self.checkpoint_path.trim().is_empty() {
            return Err("state.checkpoint_path cannot be empty when checkpointing is enabled".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Console output format (text or json)
    #[serde(default = "default_console_format")]
    pub console_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            console_format: default_console_format(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.console_format.as_str()) {
            return Err(format!(
                "Invalid logging.console_format '{}'. Must be one of: {}",
                self.console_format,
                valid_formats.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when file logging is enabled".to_string());
        }
        Ok(())
    }
}

fn parse_kinds(field: &str, names: &[String]) -> Result<Vec<ErrorKind>, String> {
    names
        .iter()
        .map(|name| {
            ErrorKind::from_str(name).map_err(|e| format!("{field}: {e}"))
        })
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    1
}

fn default_scan_mode() -> String {
    "item_by_item".to_string()
}

fn default_retry_cache_capacity() -> usize {
    4096
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retryable() -> Vec<String> {
    vec!["write".to_string()]
}

fn default_skip_limit() -> usize {
    10
}

fn default_skippable() -> Vec<String> {
    vec!["read".to_string(), "process".to_string(), "write".to_string()]
}

fn default_isolation() -> String {
    "default".to_string()
}

fn default_processor() -> String {
    "identity".to_string()
}

fn default_checkpoint_path() -> String {
    ".chunkwise/state".to_string()
}

fn default_local_path() -> String {
    "logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_console_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> StepConfig {
        StepConfig {
            name: "lines".to_string(),
            chunk_size: 10,
            fault_tolerant: true,
            buffering: true,
            concurrency: 1,
            scan_mode: "item_by_item".to_string(),
            retry_cache_capacity: 4096,
            retry: RetryConfig::default(),
            skip: SkipConfig::default(),
        }
    }

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_step_config_validation() {
        let mut config = step();
        assert!(config.validate().is_ok());

        config.chunk_size = 0;
        assert!(config.validate().is_err());

        config.chunk_size = 10;
        config.concurrency = 0;
        assert!(config.validate().is_err());

        config.concurrency = 4;
        config.scan_mode = "bisect".to_string();
        assert!(config.validate().is_err());

        config.concurrency = 1;
        assert!(config.validate().is_ok());

        config.buffering = false;
        assert!(config.validate().is_err());

        config.scan_mode = "sideways".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut config = RetryConfig::default();
        assert!(config.validate().is_ok());

        config.max_attempts = 0;
        assert!(config.validate().is_err());

        config.max_attempts = 3;
        config.initial_delay_ms = 10_000;
        assert!(config.validate().is_err());

        config.initial_delay_ms = 100;
        config.retryable = vec!["cosmic-ray".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_skip_kinds_parse() {
        let config = SkipConfig::default();
        assert_eq!(
            config.skippable_kinds().unwrap(),
            vec![ErrorKind::Read, ErrorKind::Process, ErrorKind::Write]
        );
    }

    #[test]
    fn test_source_processor_validation() {
        let mut config = SourceConfig {
            path: "in.txt".to_string(),
            processor: "uppercase".to_string(),
        };
        assert!(config.validate().is_ok());

        config.processor = "reverse".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.local_rotation = "weekly".to_string();
        assert!(config.validate().is_err());

        config.local_rotation = "hourly".to_string();
        config.console_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transaction_isolation_validation() {
        let mut config = TransactionConfig::default();
        assert!(config.validate().is_ok());

        config.isolation = "chaotic".to_string();
        assert!(config.validate().is_err());
    }
}
