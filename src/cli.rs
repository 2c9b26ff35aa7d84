//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use batch_exec::config::{CONFIG_ENV, ENDPOINT_ENV};
use batch_exec::output::OutputConfig;
use clap::{Parser, Subcommand};

use crate::commands::{self, GlobalOptions};

/// Batch exec - Run batch changes across many repositories
#[derive(Parser, Debug)]
#[command(name = "batch-exec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to $HOME/batch-exec-config.json)
    #[arg(long, global = true, value_name = "PATH", env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Endpoint of the batch changes service
    #[arg(long, global = true, value_name = "URL", env = ENDPOINT_ENV)]
    endpoint: Option<String>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a batch spec against local repositories
    Exec(commands::exec::ExecArgs),

    /// Manage the execution cache
    Cache(commands::cache::CacheArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Initialize `env_logger`. `RUST_LOG` wins over `--log-level`.
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.log_level.as_str());
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp(None)
            .format_target(false)
            .try_init();
    }

    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let global = GlobalOptions {
            config_path: self.config,
            endpoint: self.endpoint,
            output: OutputConfig::from_env_and_flag(&self.color),
        };

        match self.command {
            Commands::Exec(args) => commands::exec::execute(args, &global),
            Commands::Cache(args) => commands::cache::execute(args, &global),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
