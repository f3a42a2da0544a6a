//! Fixgraph Sync - the incremental extraction pipeline
//!
//! This crate drives one sync run over a git history:
//! - Walking commits past the per-branch watermark
//! - Deriving a content identifier for each change
//! - Parsing Fixes tags and revert notices out of commit messages
//! - Persisting nodes, then edges, then the advanced watermark

mod extract;
mod patch_id;
mod repo;
mod sync;

pub use extract::{Extraction, FixExtractor, RevertDedup};
pub use repo::{CommitSummary, CommitWalk, GitRepo};
pub use sync::{SyncOptions, SyncStats, Syncer};
