//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the chunkwise configuration file.

use super::EXIT_CONFIG_ERROR;
use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("Validating configuration file: {config_path}");
        println!();

        // load_config validates as well
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("Configuration is invalid");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        let step = &config.step;
        println!("Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Step: {}", step.name);
        println!("  Chunk Size: {}", step.chunk_size);
        println!("  Fault Tolerant: {}", step.fault_tolerant);
        if step.fault_tolerant {
            println!(
                "  Retry: {} attempts on {:?}",
                step.retry.max_attempts, step.retry.retryable
            );
            println!(
                "  Skip: limit {} on {:?}",
                step.skip.limit, step.skip.skippable
            );
            println!("  Scan Mode: {}", step.scan_mode);
        }
        println!("  Buffering: {}", step.buffering);
        println!("  Concurrency: {}", step.concurrency);
        println!(
            "  Source: {} ({})",
            config.source.path, config.source.processor
        );
        println!("  Sink: {}", config.sink.path);
        if config.state.enable_checkpointing {
            println!("  Checkpoints: {}", config.state.checkpoint_path);
        } else {
            println!("  Checkpoints: disabled");
        }
        println!();
        Ok(0)
    }
}
