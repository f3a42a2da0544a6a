//! Database operations and management

use anyhow::{Context, Result};
use fixgraph_core::{CommitRecord, FixEdge, Watermark};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

/// Outcome of a commit-node insertion.
///
/// Duplicate nodes are expected all the time across re-runs and
/// overlapping ranges, so "already exists" is a regular outcome, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Outcome of a fix-edge insertion. Best-effort: an edge whose endpoint
/// is not yet in the node table is reported, not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    Inserted,
    AlreadyExists,
    ReferenceMissing,
}

/// Internal representation of a commit node stored in sled. The sha is
/// the tree key, so only the payload fields are packed.
#[derive(Serialize, Deserialize)]
struct StoredCommit {
    description: String,
    patch_id: String,
}

/// Internal representation of a branch watermark.
#[derive(Serialize, Deserialize)]
struct StoredWatermark {
    last_sha: String,
    updated_at: u64,
}

/// Main structure managing the database
pub struct FixStore {
    /// Tree storing commit nodes (key: abbreviated sha)
    commits: sled::Tree,

    /// Tree storing fix edges (key: "fixed_sha:fixing_sha")
    fixes: sled::Tree,

    /// Reverse index from exact description to sha, for the Fixes-tag
    /// fallback lookup. First writer wins.
    descriptions: sled::Tree,

    /// Tree storing per-branch watermarks (key: branch name)
    watermarks: sled::Tree,

    /// Sled database instance
    db: Db,

    /// Path to the database directory (for size calculation)
    path: std::path::PathBuf,
}

impl FixStore {
    /// Opens or creates a new database at the specified location
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        let commits = db
            .open_tree("commits")
            .context("Failed to open commits tree")?;

        let fixes = db.open_tree("fixes").context("Failed to open fixes tree")?;

        let descriptions = db
            .open_tree("descriptions")
            .context("Failed to open descriptions tree")?;

        let watermarks = db
            .open_tree("watermarks")
            .context("Failed to open watermarks tree")?;

        Ok(Self {
            commits,
            fixes,
            descriptions,
            watermarks,
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Inserts a commit node if no node with the same sha exists yet.
    ///
    /// Nodes are append-only: an existing record is never overwritten,
    /// concurrent runs racing on the same sha settle on exactly one row.
    pub fn insert_commit(&self, record: &CommitRecord) -> Result<InsertOutcome> {
        let stored = StoredCommit {
            description: record.description.clone(),
            patch_id: record.patch_id.clone(),
        };
        let value = bincode::serialize(&stored).context("Failed to serialize CommitRecord")?;

        let outcome = self
            .commits
            .compare_and_swap(record.sha.as_bytes(), None as Option<&[u8]>, Some(value))
            .context("Failed to insert commit node")?;

        match outcome {
            Ok(()) => {
                // Maintain the description index only for the winning
                // insert; a later commit reusing a description must not
                // steal the mapping.
                let _ = self.descriptions.compare_and_swap(
                    record.description.as_bytes(),
                    None as Option<&[u8]>,
                    Some(record.sha.as_bytes()),
                )?;
                Ok(InsertOutcome::Inserted)
            }
            Err(_) => Ok(InsertOutcome::AlreadyExists),
        }
    }

    /// Inserts a fix edge if both endpoints exist in the node table.
    ///
    /// The caller flushes all nodes of a batch before the edge phase, so
    /// `ReferenceMissing` here means the fixed commit predates the tracked
    /// range or was never ingested at all.
    pub fn insert_fix_edge(&self, edge: &FixEdge) -> Result<EdgeOutcome> {
        if !self.commits.contains_key(edge.fixed_sha.as_bytes())?
            || !self.commits.contains_key(edge.fixing_sha.as_bytes())?
        {
            return Ok(EdgeOutcome::ReferenceMissing);
        }

        let outcome = self
            .fixes
            .compare_and_swap(edge.key().as_bytes(), None as Option<&[u8]>, Some(&[][..]))
            .context("Failed to insert fix edge")?;

        match outcome {
            Ok(()) => Ok(EdgeOutcome::Inserted),
            Err(_) => Ok(EdgeOutcome::AlreadyExists),
        }
    }

    /// Retrieves a commit node by sha
    pub fn get_commit(&self, sha: &str) -> Result<Option<CommitRecord>> {
        match self.commits.get(sha.as_bytes())? {
            Some(bytes) => {
                let stored: StoredCommit =
                    bincode::deserialize(&bytes).context("Failed to deserialize CommitRecord")?;
                Ok(Some(CommitRecord::new(
                    sha.to_string(),
                    stored.description,
                    stored.patch_id,
                )))
            }
            None => Ok(None),
        }
    }

    /// Looks up a commit sha by its exact one-line description.
    /// Used as the fallback when a Fixes-tag token does not resolve.
    pub fn lookup_sha_by_description(&self, description: &str) -> Result<Option<String>> {
        match self.descriptions.get(description.as_bytes())? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes.to_vec()).context("Corrupted description index entry")?,
            )),
            None => Ok(None),
        }
    }

    /// Returns all edges pointing at the given fixed sha, i.e. every
    /// commit recorded as fixing or reverting it.
    pub fn fixes_for(&self, fixed_sha: &str) -> Result<Vec<FixEdge>> {
        let prefix = format!("{}:", fixed_sha);
        let mut results = Vec::new();

        for item in self.fixes.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item.context("Failed to read from database")?;
            let key = std::str::from_utf8(&key).context("Corrupted edge key")?;
            let (fixed, fixing) = key
                .split_once(':')
                .context("Edge key missing separator")?;
            results.push(FixEdge::new(fixed.to_string(), fixing.to_string()));
        }

        Ok(results)
    }

    /// Reads the watermark for a branch (absent on first run)
    pub fn read_watermark(&self, branch: &str) -> Result<Option<Watermark>> {
        match self.watermarks.get(branch.as_bytes())? {
            Some(bytes) => {
                let stored: StoredWatermark =
                    bincode::deserialize(&bytes).context("Failed to deserialize watermark")?;
                Ok(Some(Watermark {
                    branch: branch.to_string(),
                    last_sha: stored.last_sha,
                    updated_at: stored.updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Advances the watermark for a branch
    pub fn write_watermark(&self, branch: &str, last_sha: &str, updated_at: u64) -> Result<()> {
        let stored = StoredWatermark {
            last_sha: last_sha.to_string(),
            updated_at,
        };
        let value = bincode::serialize(&stored).context("Failed to serialize watermark")?;
        self.watermarks
            .insert(branch.as_bytes(), value)
            .context("Failed to write watermark")?;
        Ok(())
    }

    /// Returns all branch watermarks
    pub fn watermarks(&self) -> Result<Vec<Watermark>> {
        let mut results = Vec::new();
        for item in self.watermarks.iter() {
            let (key, value) = item.context("Failed to read from database")?;
            let branch = String::from_utf8(key.to_vec()).context("Corrupted watermark key")?;
            let stored: StoredWatermark =
                bincode::deserialize(&value).context("Failed to deserialize watermark")?;
            results.push(Watermark {
                branch,
                last_sha: stored.last_sha,
                updated_at: stored.updated_at,
            });
        }
        Ok(results)
    }

    /// Returns the number of stored commit nodes
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Returns the number of stored fix edges
    pub fn edge_count(&self) -> usize {
        self.fixes.len()
    }

    /// Checks if the database is empty (no commits ingested yet)
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.commits.is_empty())
    }

    /// Returns total on-disk size of the database directory in bytes.
    /// Sums sizes of all files inside the sled directory recursively.
    pub fn db_size_bytes(&self) -> u64 {
        fn dir_size(path: &std::path::Path) -> u64 {
            let Ok(entries) = std::fs::read_dir(path) else {
                return 0;
            };
            entries
                .flatten()
                .map(|e| {
                    let p = e.path();
                    if p.is_dir() {
                        dir_size(&p)
                    } else {
                        e.metadata().map(|m| m.len()).unwrap_or(0)
                    }
                })
                .sum()
        }
        dir_size(&self.path)
    }

    /// Flushes all pending operations to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush database")?;
        Ok(())
    }
}
