//! Status command implementation
//!
//! Shows the checkpoint saved by the last run of the configured step, which
//! is where the next `run` resumes.

use super::{EXIT_CONFIG_ERROR, EXIT_FATAL};
use crate::adapters::progress::FileProgressStore;
use crate::config::load_config;
use crate::domain::StepName;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Inspect this step instead of the configured one
    #[arg(long)]
    pub step: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking step status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        if !config.state.enable_checkpointing {
            println!("Checkpointing is disabled; runs always start from the beginning.");
            return Ok(0);
        }

        let name = self.step.as_deref().unwrap_or(&config.step.name);
        let step = match StepName::new(name) {
            Ok(step) => step,
            Err(e) => {
                println!("Invalid step name: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        let store = FileProgressStore::new(&config.state.checkpoint_path);
        let checkpoint = match store.load_checkpoint(&step).await {
            Ok(c) => c,
            Err(e) => {
                println!("Failed to load checkpoint");
                println!("   Error: {e}");
                return Ok(EXIT_FATAL);
            }
        };

        let Some(checkpoint) = checkpoint else {
            println!("No checkpoint for step '{step}'.");
            println!("The last run completed, or the step never committed a chunk.");
            return Ok(0);
        };

        println!("Checkpoint for step '{}'", checkpoint.step);
        println!(
            "  Saved at: {}",
            checkpoint.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("  File: {}", store.path_for(&step).display());
        println!();
        println!("{:<40} Value", "Key");
        println!("{}", "-".repeat(60));
        for (key, value) in checkpoint.context.iter() {
            println!("{key:<40} {value}");
        }
        println!();
        Ok(0)
    }
}
