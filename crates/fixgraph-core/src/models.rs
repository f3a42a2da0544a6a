//! Core data models for the fix graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hex characters in the abbreviated commit identifier used as
/// the primary key throughout the system.
pub const SHA_ABBREV_LEN: usize = 12;

/// Commit node in the database
///
/// One row per upstream commit on the tracked branch. Append-only: once
/// inserted a record is never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitRecord {
    /// Abbreviated commit identifier (12-char hex)
    pub sha: String,

    /// One-line commit summary
    pub description: String,

    /// Content-derived identifier of the change, stable across
    /// cherry-picks and rebases of the same diff
    pub patch_id: String,
}

impl CommitRecord {
    /// Creates a new commit record
    pub fn new(sha: String, description: String, patch_id: String) -> Self {
        Self {
            sha,
            description,
            patch_id,
        }
    }
}

impl fmt::Display for CommitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sha, self.description)
    }
}

/// Directed fix/revert relationship between two commits
///
/// Both endpoints are known at construction time; the value is immutable
/// afterwards. Several edges may share a `fixed_sha` (independent fixes)
/// and a `fixing_sha` may fix several prior commits in one change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixEdge {
    /// Commit being fixed or reverted
    pub fixed_sha: String,

    /// Commit that fixes or reverts it
    pub fixing_sha: String,
}

impl FixEdge {
    /// Creates a new fix edge
    pub fn new(fixed_sha: String, fixing_sha: String) -> Self {
        Self {
            fixed_sha,
            fixing_sha,
        }
    }

    /// Generates a key for database storage
    /// Format: "fixed_sha:fixing_sha"
    pub fn key(&self) -> String {
        format!("{}:{}", self.fixed_sha, self.fixing_sha)
    }
}

impl fmt::Display for FixEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fixed by {}", self.fixed_sha, self.fixing_sha)
    }
}

/// Last fully processed point of a tracked branch
///
/// Read at the start of a run to bound the ingestion range, written at the
/// end of a successful run that read at least one commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Watermark {
    /// Tracked history line
    pub branch: String,

    /// Most recently ingested commit on that branch
    pub last_sha: String,

    /// Unix timestamp of the run that wrote this watermark
    pub updated_at: u64,
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.branch, self.last_sha)
    }
}
