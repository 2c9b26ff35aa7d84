//! # Batch Exec CLI
//!
//! Binary entry point for the `batch-exec` command-line tool. It parses the
//! arguments, sets up logging and maps failures onto process exit codes:
//!
//! - `0` on success
//! - `2` for usage errors (bad flags, invalid endpoint, unreadable spec)
//! - the explicit code of an `ExitCode` error (130 when interrupted)
//! - `1` for everything else
//!
//! All behavior lives in the `batch_exec` library.

mod cli;
mod commands;

use batch_exec::error::{exit_codes, Error};
use clap::{CommandFactory, Parser};

fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::exit_code)
        .unwrap_or(exit_codes::ERROR)
}

fn main() {
    let cli = cli::Cli::parse();
    cli.init_logging();

    if let Err(err) = cli.execute() {
        let code = exit_code(&err);
        eprintln!("Error: {:#}", err);
        if code == exit_codes::USAGE {
            eprintln!();
            eprintln!("{}", cli::Cli::command().render_usage());
        }
        std::process::exit(code);
    }
}
