//! Sync command implementation

use anyhow::{Context, Result};
use fixgraph_db::FixStore;
use fixgraph_sync::{GitRepo, RevertDedup, SyncOptions, Syncer};
use std::path::PathBuf;

/// Runs one incremental sync of the tracked branch
pub fn cmd_sync(
    repo_path: PathBuf,
    branch: String,
    root: Option<String>,
    no_fetch: bool,
    max_commits: Option<usize>,
    same_line_dedup: bool,
    db: FixStore,
) -> Result<()> {
    log::info!("Syncing {} from repository at {:?}", branch, repo_path);

    let repo = GitRepo::open(&repo_path).context("Failed to open repository")?;
    let options = SyncOptions {
        fetch: !no_fetch,
        root,
        max_commits,
        dedup: if same_line_dedup {
            RevertDedup::SameLineOnly
        } else {
            RevertDedup::PerCommit
        },
    };

    let syncer = Syncer::new(repo, db, options).context("Failed to create syncer")?;
    let stats = syncer.run(&branch).context("Sync run failed")?;

    if !stats.diagnostics.is_empty() {
        log::info!(
            "{} diagnostics recorded; re-run with --log-level debug for details",
            stats.diagnostics.len()
        );
    }
    Ok(())
}
