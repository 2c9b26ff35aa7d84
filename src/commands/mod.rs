//! # CLI Command Implementations
//!
//! One module per subcommand. Each has an `Args` struct derived with `clap`
//! and an `execute` function that wires the `batch_exec` library together
//! for that command.

use std::path::PathBuf;

use batch_exec::config::{Config, ConfigOverrides};
use batch_exec::error::Result;
use batch_exec::output::OutputConfig;

pub mod cache;
pub mod completions;
pub mod exec;

/// Flags shared by every subcommand
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub config_path: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub output: OutputConfig,
}

impl GlobalOptions {
    /// Load the configuration with the global flags and the given
    /// command-specific overrides applied
    pub fn load_config(&self, cache_dir: Option<PathBuf>, parallelism: Option<usize>) -> Result<Config> {
        Config::load(&ConfigOverrides {
            config_path: self.config_path.clone(),
            endpoint: self.endpoint.clone(),
            cache_dir,
            parallelism,
        })
    }
}
