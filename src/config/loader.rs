//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::ChunkwiseConfig;
use crate::domain::{BatchError, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ChunkwiseConfig
/// 4. Applies environment variable overrides (CHUNKWISE_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns `BatchError::Configuration` if the file cannot be read or parsed, a
/// referenced variable is unset, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use chunkwise::config::loader::load_config;
///
/// let config = load_config("chunkwise.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ChunkwiseConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(BatchError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        BatchError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parse, override and validate configuration text
///
/// # Errors
///
/// Same as [`load_config`], minus file access.
pub fn parse_config(contents: &str) -> Result<ChunkwiseConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ChunkwiseConfig = toml::from_str(&contents)
        .map_err(|e| BatchError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        BatchError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| BatchError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(BatchError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map(Some).map_err(|_| {
            BatchError::Configuration(format!("Invalid value '{value}' for {name}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|value| {
        value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Applies environment variable overrides using CHUNKWISE_* prefix
///
/// Variables follow the pattern `CHUNKWISE_<SECTION>_<KEY>`, for example
/// `CHUNKWISE_STEP_CHUNK_SIZE`. List values are comma separated.
fn apply_env_overrides(config: &mut ChunkwiseConfig) -> Result<()> {
    if let Ok(val) = std::env::var("CHUNKWISE_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Step overrides
    if let Ok(val) = std::env::var("CHUNKWISE_STEP_NAME") {
        config.step.name = val;
    }
    if let Some(size) = env_parse("CHUNKWISE_STEP_CHUNK_SIZE")? {
        config.step.chunk_size = size;
    }
    if let Some(enabled) = env_parse("CHUNKWISE_STEP_FAULT_TOLERANT")? {
        config.step.fault_tolerant = enabled;
    }
    if let Some(enabled) = env_parse("CHUNKWISE_STEP_BUFFERING")? {
        config.step.buffering = enabled;
    }
    if let Some(concurrency) = env_parse("CHUNKWISE_STEP_CONCURRENCY")? {
        config.step.concurrency = concurrency;
    }
    if let Ok(val) = std::env::var("CHUNKWISE_STEP_SCAN_MODE") {
        config.step.scan_mode = val;
    }
    if let Some(attempts) = env_parse("CHUNKWISE_STEP_RETRY_MAX_ATTEMPTS")? {
        config.step.retry.max_attempts = attempts;
    }
    if let Some(delay) = env_parse("CHUNKWISE_STEP_RETRY_INITIAL_DELAY_MS")? {
        config.step.retry.initial_delay_ms = delay;
    }
    if let Some(delay) = env_parse("CHUNKWISE_STEP_RETRY_MAX_DELAY_MS")? {
        config.step.retry.max_delay_ms = delay;
    }
    if let Some(kinds) = env_list("CHUNKWISE_STEP_RETRY_RETRYABLE") {
        config.step.retry.retryable = kinds;
    }
    if let Some(limit) = env_parse("CHUNKWISE_STEP_SKIP_LIMIT")? {
        config.step.skip.limit = limit;
    }
    if let Some(kinds) = env_list("CHUNKWISE_STEP_SKIP_SKIPPABLE") {
        config.step.skip.skippable = kinds;
    }

    // Transaction overrides
    if let Some(timeout) = env_parse("CHUNKWISE_TRANSACTION_TIMEOUT_SECONDS")? {
        config.transaction.timeout_seconds = timeout;
    }
    if let Ok(val) = std::env::var("CHUNKWISE_TRANSACTION_ISOLATION") {
        config.transaction.isolation = val;
    }

    // Source and sink overrides
    if let Ok(val) = std::env::var("CHUNKWISE_SOURCE_PATH") {
        config.source.path = val;
    }
    if let Ok(val) = std::env::var("CHUNKWISE_SOURCE_PROCESSOR") {
        config.source.processor = val;
    }
    if let Ok(val) = std::env::var("CHUNKWISE_SINK_PATH") {
        config.sink.path = val;
    }

    // State overrides
    if let Some(enabled) = env_parse("CHUNKWISE_STATE_ENABLE_CHECKPOINTING")? {
        config.state.enable_checkpointing = enabled;
    }
    if let Ok(val) = std::env::var("CHUNKWISE_STATE_CHECKPOINT_PATH") {
        config.state.checkpoint_path = val;
    }

    // Logging overrides
    if let Some(enabled) = env_parse("CHUNKWISE_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = enabled;
    }
    if let Ok(val) = std::env::var("CHUNKWISE_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("CHUNKWISE_LOGGING_CONSOLE_FORMAT") {
        config.logging.console_format = val;
    }

    Ok(())
}
