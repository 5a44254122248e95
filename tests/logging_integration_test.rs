//! Integration tests for logging functionality

use chunkwise::config::LoggingConfig;
use chunkwise::logging::init_logging;
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(!config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert_eq!(config.console_format, "text");
}

#[test]
fn test_invalid_log_level_is_rejected() {
    let result = init_logging("verbose", &LoggingConfig::default());
    assert!(result.is_err());
    if let Err(e) = result {
        assert!(e.to_string().contains("Invalid log level"));
    }
}

// The global subscriber can be installed once per process, so file logging
// and the double-install check share one test.
#[test]
fn test_file_logging_creates_directory_once() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "never".to_string(),
        console_format: "json".to_string(),
    };
    assert!(!log_path.exists());

    let guard = init_logging("debug", &config).unwrap();
    tracing::info!(step = "logging-test", "File logging ready");
    assert!(log_path.is_dir());

    let second = init_logging("debug", &config);
    assert!(second.is_err());
    drop(guard);
}
