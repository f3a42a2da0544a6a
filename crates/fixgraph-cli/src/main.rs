//! Fixgraph CLI - Incremental tracker of fix/revert relationships
//!
//! Provides:
//! - Incremental synchronization of a tracked branch into the database
//! - Lookup of the commits that fix or revert a given commit
//! - Database statistics

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixgraph_db::FixStore;
use std::path::PathBuf;

use commands::{cmd_fixes, cmd_stats, cmd_sync};

#[derive(Parser)]
#[command(name = "fixgraph")]
#[command(about = "Tracks which commits fix or revert earlier commits", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the database
    #[arg(short, long, default_value = "./fixgraph.db")]
    database: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs one incremental sync of a tracked branch
    Sync {
        /// Path to the local clone of the tracked repository
        #[arg(short, long)]
        repo: PathBuf,

        /// Branch (or rev) whose history is tracked
        #[arg(short, long, default_value = "master")]
        branch: String,

        /// Start of history for the first-ever run; full history if omitted
        #[arg(long)]
        root: Option<String>,

        /// Skip updating the clone from its remote before reading
        #[arg(long)]
        no_fetch: bool,

        /// Maximum number of commits to ingest in this run
        #[arg(short, long)]
        max_commits: Option<usize>,

        /// Drop a revert edge only when the matching Fixes tag is on the
        /// same message line
        #[arg(long)]
        same_line_dedup: bool,
    },

    /// Lists the commits recorded as fixing or reverting a commit
    Fixes {
        /// Commit sha (abbreviated or full)
        sha: String,
    },

    /// Show database statistics
    Stats {
        /// Emit statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    // Open database
    let db = FixStore::open(&cli.database)
        .with_context(|| format!("Failed to open database at {:?}", cli.database))?;

    match cli.command {
        Commands::Sync {
            repo,
            branch,
            root,
            no_fetch,
            max_commits,
            same_line_dedup,
        } => {
            cmd_sync(repo, branch, root, no_fetch, max_commits, same_line_dedup, db)?;
        }
        Commands::Fixes { sha } => {
            cmd_fixes(&sha, db)?;
        }
        Commands::Stats { json } => {
            cmd_stats(json, db)?;
        }
    }

    Ok(())
}
