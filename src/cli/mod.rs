//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for chunkwise using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Chunkwise - Chunk-oriented batch processing engine
#[derive(Parser, Debug)]
#[command(name = "chunkwise")]
#[command(version, about, long_about = None)]
#[command(author = "Chunkwise Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "chunkwise.toml", env = "CHUNKWISE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CHUNKWISE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured step, resuming from its checkpoint
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show the saved checkpoint of the configured step
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["chunkwise", "run"]);
        assert_eq!(cli.config, "chunkwise.toml");
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_cli_parse_run_overrides() {
        let cli = Cli::parse_from(["chunkwise", "run", "--chunk-size", "50", "--restart"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.chunk_size, Some(50));
                assert!(args.restart);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["chunkwise", "--config", "custom.toml", "run"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["chunkwise", "--log-level", "debug", "run"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["chunkwise", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["chunkwise", "status"]);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["chunkwise", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
