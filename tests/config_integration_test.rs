//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables should be run with --test-threads=1
//! to avoid interference between tests.

use chunkwise::config::load_config;
use chunkwise::core::processor::ScanMode;
use chunkwise::domain::ErrorKind;
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Helper function to clean up environment variables
fn cleanup_env_vars() {
    std::env::remove_var("CHUNKWISE_APPLICATION_LOG_LEVEL");
    std::env::remove_var("CHUNKWISE_STEP_CHUNK_SIZE");
    std::env::remove_var("CHUNKWISE_STEP_SCAN_MODE");
    std::env::remove_var("CHUNKWISE_STEP_SKIP_SKIPPABLE");
    std::env::remove_var("TEST_CHUNKWISE_INPUT");
    std::env::remove_var("TEST_CHUNKWISE_OUTPUT");
}

fn write_config(toml_content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(toml_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let toml_content = r#"
[application]
log_level = "debug"

[step]
name = "import-orders"
chunk_size = 250
fault_tolerant = true
buffering = true
concurrency = 1
scan_mode = "bisect"
retry_cache_capacity = 512

[step.retry]
max_attempts = 5
initial_delay_ms = 50
max_delay_ms = 2000
backoff_multiplier = 1.5
jitter = true
retryable = ["write", "process"]

[step.skip]
limit = 25
skippable = ["read", "write"]

[transaction]
timeout_seconds = 30
isolation = "serializable"

[source]
path = "data/orders.txt"
processor = "trim"

[sink]
path = "out/orders.txt"

[state]
enable_checkpointing = false
checkpoint_path = "/tmp/chunkwise-state"

[logging]
local_enabled = false
local_path = "/tmp/chunkwise"
local_rotation = "hourly"
console_format = "json"
"#;

    let temp_file = write_config(toml_content);
    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "debug");

    // Verify step config
    assert_eq!(config.step.name, "import-orders");
    assert_eq!(config.step.chunk_size, 250);
    assert!(config.step.fault_tolerant);
    assert_eq!(config.step.scan_mode().unwrap(), ScanMode::Bisect);
    assert_eq!(config.step.retry_cache_capacity, 512);

    // Verify retry and skip config
    assert_eq!(config.step.retry.max_attempts, 5);
    assert_eq!(config.step.retry.max_delay_ms, 2000);
    assert!(config.step.retry.jitter);
    assert_eq!(
        config.step.retry.retryable_kinds().unwrap(),
        vec![ErrorKind::Write, ErrorKind::Process]
    );
    assert_eq!(config.step.skip.limit, 25);
    assert_eq!(
        config.step.skip.skippable_kinds().unwrap(),
        vec![ErrorKind::Read, ErrorKind::Write]
    );

    // Verify transaction, source and sink config
    assert_eq!(config.transaction.timeout_seconds, 30);
    assert_eq!(config.transaction.isolation, "serializable");
    assert_eq!(config.source.path, "data/orders.txt");
    assert_eq!(config.source.processor, "trim");
    assert_eq!(config.sink.path, "out/orders.txt");

    // Verify state and logging config
    assert!(!config.state.enable_checkpointing);
    assert_eq!(config.state.checkpoint_path, "/tmp/chunkwise-state");
    assert_eq!(config.logging.local_rotation, "hourly");
    assert_eq!(config.logging.console_format, "json");
}

#[test]
fn test_load_minimal_config_with_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let toml_content = r#"
[step]
name = "copy"

[source]
path = "in.txt"

[sink]
path = "out.txt"
"#;

    let temp_file = write_config(toml_content);
    let config = load_config(temp_file.path()).expect("Failed to load config");

    // Verify defaults are applied
    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.step.chunk_size, 100);
    assert!(!config.step.fault_tolerant);
    assert!(config.step.buffering);
    assert_eq!(config.step.concurrency, 1);
    assert_eq!(config.step.scan_mode().unwrap(), ScanMode::ItemByItem);
    assert_eq!(config.step.retry.max_attempts, 3);
    assert_eq!(config.step.skip.limit, 10);
    assert_eq!(config.transaction.timeout_seconds, 0);
    assert_eq!(config.source.processor, "identity");
    assert!(config.state.enable_checkpointing);
    assert_eq!(config.state.checkpoint_path, ".chunkwise/state");
    assert!(!config.logging.local_enabled);
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_CHUNKWISE_INPUT", "/data/in.txt");
    std::env::set_var("TEST_CHUNKWISE_OUTPUT", "/data/out.txt");

    let toml_content = r#"
[step]
name = "copy"

[source]
path = "${TEST_CHUNKWISE_INPUT}"

[sink]
path = "${TEST_CHUNKWISE_OUTPUT}"
"#;

    let temp_file = write_config(toml_content);
    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.source.path, "/data/in.txt");
    assert_eq!(config.sink.path, "/data/out.txt");

    cleanup_env_vars();
}

#[test]
fn test_env_var_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("CHUNKWISE_APPLICATION_LOG_LEVEL", "trace");
    std::env::set_var("CHUNKWISE_STEP_CHUNK_SIZE", "2000");
    std::env::set_var("CHUNKWISE_STEP_SKIP_SKIPPABLE", "process, write");

    let toml_content = r#"
[application]
log_level = "info"

[step]
name = "copy"
chunk_size = 10

[source]
path = "in.txt"

[sink]
path = "out.txt"
"#;

    let temp_file = write_config(toml_content);
    let config = load_config(temp_file.path()).expect("Failed to load config");

    // Verify env var overrides took effect
    assert_eq!(config.application.log_level, "trace");
    assert_eq!(config.step.chunk_size, 2000);
    assert_eq!(
        config.step.skip.skippable_kinds().unwrap(),
        vec![ErrorKind::Process, ErrorKind::Write]
    );

    cleanup_env_vars();
}

#[test]
fn test_invalid_env_override_is_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("CHUNKWISE_STEP_CHUNK_SIZE", "lots");

    let toml_content = r#"
[step]
name = "copy"

[source]
path = "in.txt"

[sink]
path = "out.txt"
"#;

    let temp_file = write_config(toml_content);
    let result = load_config(temp_file.path());
    assert!(result.is_err());

    cleanup_env_vars();
}

#[test]
fn test_invalid_config_validation() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let toml_content = r#"
[application]
log_level = "invalid_level"

[step]
name = "copy"

[source]
path = "in.txt"

[sink]
path = "out.txt"
"#;

    let temp_file = write_config(toml_content);
    let result = load_config(temp_file.path());
    assert!(result.is_err());
}

#[test]
fn test_missing_required_sections() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let without_step = r#"
[source]
path = "in.txt"

[sink]
path = "out.txt"
"#;
    let without_sink = r#"
[step]
name = "copy"

[source]
path = "in.txt"
"#;

    assert!(load_config(write_config(without_step).path()).is_err());
    assert!(load_config(write_config(without_sink).path()).is_err());
}

#[test]
fn test_bisect_without_buffering_is_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let toml_content = r#"
[step]
name = "copy"
buffering = false
scan_mode = "bisect"

[source]
path = "in.txt"

[sink]
path = "out.txt"
"#;

    let temp_file = write_config(toml_content);
    let error = load_config(temp_file.path()).unwrap_err();
    assert!(error.to_string().contains("requires buffering"));
}
