//! # Completions Command Implementation
//!
//! Writes a shell completion script for `batch-exec` to stdout, generated
//! with `clap_complete`.
//!
//! ```bash
//! batch-exec completions bash > ~/.local/share/bash-completion/completions/batch-exec
//! batch-exec completions zsh > ~/.zfunc/_batch-exec
//! ```

use std::io;

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::cli::Cli;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn execute(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "batch-exec", &mut io::stdout());
    Ok(())
}
