//! # Cache Command Implementation
//!
//! Inspects and empties the execution cache.
//!
//! - **`list`**: every stored entry with its size
//! - **`clear`**: remove all entries

use std::path::PathBuf;

use anyhow::{Context, Result};
use batch_exec::cache::{DiskCache, ExecutionCache};
use clap::{Args, Subcommand};
use serde::Serialize;

use super::GlobalOptions;

/// Manage the execution cache
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Cache directory (defaults to the configured one)
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// List cached step results
    List(ListArgs),
    /// Remove every cached step result
    Clear,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ListedEntry {
    key: String,
    size: u64,
}

pub fn execute(args: CacheArgs, global: &GlobalOptions) -> Result<()> {
    let config = global.load_config(args.cache_dir, None)?;
    let cache = DiskCache::new(config.cache_dir);

    match args.command {
        CacheSubcommand::List(list) => execute_list(&cache, list),
        CacheSubcommand::Clear => execute_clear(&cache),
    }
}

fn execute_list(cache: &DiskCache, args: ListArgs) -> Result<()> {
    let entries = cache
        .list()
        .with_context(|| format!("Failed to read cache at {}", cache.root().display()))?;

    if args.json {
        let listed: Vec<ListedEntry> = entries
            .into_iter()
            .map(|(key, size)| ListedEntry { key, size })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No cache entries found in: {}", cache.root().display());
        return Ok(());
    }

    println!("Cache entries in {}:", cache.root().display());
    let mut total = 0;
    for (key, size) in &entries {
        println!("  {}  {}", key, format_size(*size));
        total += size;
    }
    println!("{} entries, {}", entries.len(), format_size(total));
    Ok(())
}

fn execute_clear(cache: &DiskCache) -> Result<()> {
    let removed = cache
        .clear()
        .with_context(|| format!("Failed to clear cache at {}", cache.root().display()))?;
    println!("Removed {} cache entries", removed);
    Ok(())
}

/// Human-readable byte size
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
