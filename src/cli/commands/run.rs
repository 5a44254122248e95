//! Run command implementation
//!
//! Builds a line file step from the configuration: the source file is read
//! line by line, passed through the configured processor, and appended to the
//! sink file. Progress is checkpointed after every chunk so an interrupted run
//! resumes where it stopped.

use super::{exit_code, EXIT_CONFIG_ERROR, EXIT_FATAL};
use crate::adapters::file::{LineItemReader, LineItemWriter};
use crate::adapters::processors::line_processor;
use crate::adapters::progress::{FileProgressStore, InMemoryProgressStore};
use crate::adapters::traits::ProgressStore;
use crate::config::{load_config, ChunkwiseConfig};
use crate::core::step::{ChunkStep, StepBuilder};
use crate::domain::{Result, StepName};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the chunk size
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Override the number of concurrent process workers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Discard the saved checkpoint and start from the beginning
    #[arg(long)]
    pub restart: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Starting run command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        if let Some(chunk_size) = self.chunk_size {
            tracing::info!(chunk_size, "Overriding chunk size from CLI");
            config.step.chunk_size = chunk_size;
        }
        if let Some(concurrency) = self.concurrency {
            tracing::info!(concurrency, "Overriding concurrency from CLI");
            config.step.concurrency = concurrency;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(EXIT_CONFIG_ERROR);
        }

        let store = progress_store(&config);
        let mut step = match build_step(&config, Arc::clone(&store), shutdown_signal) {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build step");
                eprintln!("Failed to build step: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        if self.restart {
            tracing::info!(step = %step.name(), "Discarding saved checkpoint");
            store.clear(step.name()).await?;
        }

        println!(
            "Running step '{}': {} -> {}",
            config.step.name, config.source.path, config.sink.path
        );

        let execution = match step.execute().await {
            Ok(execution) => execution,
            Err(e) => {
                tracing::error!(error = %e, "Step failed to start");
                eprintln!("Step failed to start: {e}");
                return Ok(EXIT_FATAL);
            }
        };

        println!();
        println!("Status:     {}", execution.status);
        println!("Read:       {}", execution.read_count);
        println!("Written:    {}", execution.write_count);
        println!("Filtered:   {}", execution.filter_count);
        println!(
            "Skipped:    {} (read {}, process {}, write {})",
            execution.skip_count(),
            execution.read_skip_count,
            execution.process_skip_count,
            execution.write_skip_count
        );
        println!(
            "Commits:    {} ({} rollbacks)",
            execution.commit_count, execution.rollback_count
        );
        for failure in &execution.failures {
            println!("Failure:    {failure}");
        }

        Ok(exit_code(execution.status))
    }
}

fn progress_store(config: &ChunkwiseConfig) -> Arc<dyn ProgressStore> {
    if config.state.enable_checkpointing {
        Arc::new(FileProgressStore::new(&config.state.checkpoint_path))
    } else {
        Arc::new(InMemoryProgressStore::new())
    }
}

/// Assemble the line file step described by `config`
///
/// # Errors
///
/// Returns `BatchError::Configuration` for an invalid step name, processor or
/// step setting.
pub fn build_step(
    config: &ChunkwiseConfig,
    store: Arc<dyn ProgressStore>,
    shutdown_signal: watch::Receiver<bool>,
) -> Result<ChunkStep<String, String>> {
    let name = StepName::new(config.step.name.as_str())
        .map_err(crate::domain::BatchError::Configuration)?;

    StepBuilder::new(name)
        .reader(LineItemReader::new(&config.source.path))
        .shared_processor(line_processor(&config.source.processor)?)
        .writer(LineItemWriter::new(&config.sink.path))
        .progress_store(store)
        .shutdown_signal(shutdown_signal)
        .apply_config(&config.step)?
        .apply_transaction_config(&config.transaction)?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir, extra: &str) -> ChunkwiseConfig {
        let toml = format!(
            r#"
[step]
name = "upper"
chunk_size = 2
{extra}

[source]
path = "{input}"
processor = "uppercase"

[sink]
path = "{output}"

[state]
checkpoint_path = "{state}"
"#,
            input = dir.path().join("in.txt").display(),
            output = dir.path().join("out.txt").display(),
            state = dir.path().join("state").display(),
        );
        parse_config(&toml).unwrap()
    }

    #[tokio::test]
    async fn test_build_step_runs_line_pipeline() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("in.txt"), "a\nb\nc\n")
            .await
            .unwrap();
        let config = config_for(&dir, "");
        let (_tx, rx) = watch::channel(false);

        let mut step = build_step(&config, progress_store(&config), rx).unwrap();
        let execution = step.execute().await.unwrap();

        assert_eq!(exit_code(execution.status), 0);
        assert_eq!(execution.write_count, 3);
        assert_eq!(execution.commit_count, 2);
        let output = tokio::fs::read_to_string(dir.path().join("out.txt"))
            .await
            .unwrap();
        assert_eq!(output, "A\nB\nC\n");
    }

    #[tokio::test]
    async fn test_build_step_rejects_bisect_with_concurrency() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir, "fault_tolerant = true\nscan_mode = \"bisect\"");
        // bypasses config validation, as a CLI override would
        config.step.concurrency = 4;
        let (_tx, rx) = watch::channel(false);

        let result = build_step(&config, progress_store(&config), rx);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_args_defaults() {
        let args = RunArgs {
            chunk_size: None,
            concurrency: None,
            restart: false,
        };
        assert!(args.chunk_size.is_none());
        assert!(!args.restart);
    }
}
