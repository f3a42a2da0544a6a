//! Sync coordinator: one incremental run of the pipeline

use anyhow::{Context, Result};
use fixgraph_core::{CommitRecord, FixEdge};
use fixgraph_db::{EdgeOutcome, FixStore, InsertOutcome};
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::extract::{FixExtractor, RevertDedup};
use crate::repo::GitRepo;

/// Options for one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Update the local clone from its remote before reading history
    pub fetch: bool,

    /// Start boundary for the first-ever run of a branch, when no
    /// watermark exists yet; full history if unset
    pub root: Option<String>,

    /// Upper bound on commits ingested in one run; the watermark still
    /// advances to the last commit read, so the next run resumes there
    pub max_commits: Option<usize>,

    /// De-duplication policy between Fixes and revert edges
    pub dedup: RevertDedup,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch: true,
            root: None,
            max_commits: None,
            dedup: RevertDedup::default(),
        }
    }
}

/// Structured result of one run, from which the caller derives its exit
/// status
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub commits_read: usize,
    pub nodes_inserted: usize,
    pub duplicates: usize,
    pub edges_found: usize,
    pub edges_inserted: usize,
    pub diagnostics: Vec<String>,
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Commits: {} read, {} new, {} duplicates | Edges: {} found, {} inserted | Diagnostics: {}",
            self.commits_read,
            self.nodes_inserted,
            self.duplicates,
            self.edges_found,
            self.edges_inserted,
            self.diagnostics.len()
        )
    }
}

/// Drives one incremental sync: read commits past the watermark, persist
/// nodes eagerly, persist edges once every node of the batch exists,
/// then advance the watermark.
pub struct Syncer {
    repo: GitRepo,
    store: FixStore,
    extractor: FixExtractor,
    options: SyncOptions,
}

impl Syncer {
    pub fn new(repo: GitRepo, store: FixStore, options: SyncOptions) -> Result<Self> {
        let extractor = FixExtractor::new(options.dedup)?;
        Ok(Self {
            repo,
            store,
            extractor,
            options,
        })
    }

    pub fn store(&self) -> &FixStore {
        &self.store
    }

    /// Runs one incremental sync of `branch`.
    ///
    /// Fatal only when the repository cannot be reached or the final
    /// persistence step fails; every per-commit problem (duplicate node,
    /// undecodable message, unresolvable reference, missing edge
    /// endpoint) is recorded as a diagnostic and the run continues.
    pub fn run(&self, branch: &str) -> Result<SyncStats> {
        let start = Instant::now();
        let mut stats = SyncStats::default();

        if self.options.fetch {
            log::info!("Updating local clone for {}", branch);
            self.repo.fetch()?;
        }

        let watermark = self.store.read_watermark(branch)?;
        let since = watermark
            .as_ref()
            .map(|w| w.last_sha.clone())
            .or_else(|| self.options.root.clone());
        match &since {
            Some(sha) => log::info!("Loading {} commit log from {}", branch, sha),
            None => log::info!("First run for {}, loading full commit log", branch),
        }

        let mut pending_edges: Vec<FixEdge> = Vec::new();
        let mut last: Option<String> = None;

        for summary in self.repo.commits_since(branch, since.as_deref())? {
            if let Some(max) = self.options.max_commits {
                if stats.commits_read >= max {
                    log::info!("Reached max commit limit: {}", max);
                    break;
                }
            }

            let summary = summary?;
            stats.commits_read += 1;
            last = Some(summary.sha.clone());

            let Some(description) = summary.description else {
                let msg = format!(
                    "commit {}: summary is not valid UTF-8, node skipped",
                    summary.sha
                );
                log::warn!("{}", msg);
                stats.diagnostics.push(msg);
                continue;
            };

            let patch_id = match self.repo.patch_id(&summary.sha) {
                Ok(patch_id) => patch_id,
                Err(e) => {
                    let msg = format!("commit {}: no content id ({}), node skipped", summary.sha, e);
                    log::warn!("{}", msg);
                    stats.diagnostics.push(msg);
                    continue;
                }
            };

            let record = CommitRecord::new(summary.sha, description, patch_id);
            match self.store.insert_commit(&record) {
                Ok(InsertOutcome::Inserted) => {
                    stats.nodes_inserted += 1;
                    log::debug!("Inserted commit {}", record.sha);
                    self.extract_edges(&record.sha, &mut pending_edges, &mut stats);
                }
                Ok(InsertOutcome::AlreadyExists) => {
                    // Seen all the time on overlapping ranges and
                    // concurrent runs; informational, not an error
                    stats.duplicates += 1;
                    log::debug!("Commit {} already present", record.sha);
                }
                Err(e) => {
                    let msg = format!("commit {}: insert failed ({:#})", record.sha, e);
                    log::warn!("{}", msg);
                    stats.diagnostics.push(msg);
                }
            }

            if stats.commits_read % 100 == 0 {
                log::info!(
                    "Progress: {} commits read, {} edges pending",
                    stats.commits_read,
                    pending_edges.len()
                );
            }
        }

        // Edge phase: deferred until every node of the run exists, so
        // same-batch references resolve
        for edge in &pending_edges {
            match self.store.insert_fix_edge(edge) {
                Ok(EdgeOutcome::Inserted) => {
                    stats.edges_inserted += 1;
                    log::debug!("Recorded {}", edge);
                }
                Ok(EdgeOutcome::AlreadyExists) => {}
                Ok(EdgeOutcome::ReferenceMissing) => {
                    let msg = format!(
                        "cannot record fix: {} fixed by {}: endpoint not in commit table",
                        edge.fixed_sha, edge.fixing_sha
                    );
                    log::warn!("{}", msg);
                    stats.diagnostics.push(msg);
                }
                Err(e) => {
                    let msg = format!("edge {}: insert failed ({:#})", edge.key(), e);
                    log::warn!("{}", msg);
                    stats.diagnostics.push(msg);
                }
            }
        }

        // Nodes and edges must be durable before the watermark can name
        // them; a crash in between re-derives them idempotently
        self.store.flush().context("Failed to flush batch")?;

        if let Some(last_sha) = last {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            self.store
                .write_watermark(branch, &last_sha, now)
                .context("Failed to advance watermark")?;
            self.store.flush().context("Failed to flush watermark")?;
            log::info!("Watermark for {} advanced to {}", branch, last_sha);
        } else {
            log::info!("No new commits on {}", branch);
        }

        log::info!(
            "Sync finished in {:.1}s: {}",
            start.elapsed().as_secs_f64(),
            stats
        );
        Ok(stats)
    }

    /// Runs the extractor for a freshly inserted commit and queues the
    /// resulting edge candidates for the deferred edge phase
    fn extract_edges(&self, sha: &str, pending_edges: &mut Vec<FixEdge>, stats: &mut SyncStats) {
        let body = match self.repo.message(sha) {
            Ok(Some(body)) => body,
            Ok(None) => {
                let msg = format!("commit {}: message is not valid UTF-8, no edges", sha);
                log::warn!("{}", msg);
                stats.diagnostics.push(msg);
                return;
            }
            Err(e) => {
                let msg = format!("commit {}: message unavailable ({}), no edges", sha, e);
                log::warn!("{}", msg);
                stats.diagnostics.push(msg);
                return;
            }
        };

        match self.extractor.extract(&self.repo, &self.store, sha, &body) {
            Ok(extraction) => {
                stats.edges_found += extraction.edges.len();
                stats.diagnostics.extend(extraction.diagnostics);
                pending_edges.extend(extraction.edges);
            }
            Err(e) => {
                let msg = format!("commit {}: extraction failed ({:#})", sha, e);
                log::warn!("{}", msg);
                stats.diagnostics.push(msg);
            }
        }
    }
}
