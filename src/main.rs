//! proglog - segment inspection tool
//!
//! Opens a single commit-log segment and appends to, reads from, or
//! describes it.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::CliConfig;
use proglog_log::{Segment, SegmentScanner};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "proglog")]
#[command(about = "Inspect and drive proglog segment files")]
#[command(version)]
struct Cli {
    /// Directory holding segment files (overrides config and PROGLOG_DATA)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Base offset of the segment to open
    #[arg(short, long, default_value = "0")]
    base_offset: u64,

    /// YAML configuration file
    #[arg(short, long, env = "PROGLOG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Append one record per value
    Append {
        /// Record values
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Read the record at an absolute offset
    Read {
        /// Absolute offset
        offset: u64,
    },

    /// Show segment offsets, sizes and whether it is maxed
    Stat,

    /// List base offsets of all segments in the directory
    List,

    /// Print every record in the segment
    Dump,

    /// Delete the segment's store and index files
    Remove,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match CliConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = cli.dir {
        config.data_dir = dir;
    }

    std::fs::create_dir_all(&config.data_dir)?;
    tracing::debug!("using segment directory {}", config.data_dir.display());

    if let Commands::List = cli.command {
        let offsets = SegmentScanner::list_base_offsets(&config.data_dir)?;
        println!("{}", commands::format_list(&offsets));
        return Ok(());
    }

    let segment = Segment::open(&config.data_dir, cli.base_offset, &config.log)?;
    let removing = matches!(cli.command, Commands::Remove);

    let result = commands::execute(&segment, cli.command);
    if !removing {
        if let Err(e) = segment.close() {
            tracing::error!("failed to close segment {}: {}", cli.base_offset, e);
        }
    }

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
