//! Fixgraph Core - Shared data models for the fix-relationship graph
//!
//! This crate defines the core data structures used throughout the
//! project: `CommitRecord`, `FixEdge`, and the per-branch `Watermark`.

mod error;
mod models;

pub use error::VcsError;
pub use models::{CommitRecord, FixEdge, Watermark, SHA_ABBREV_LEN};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_edge_key() {
        let edge = FixEdge::new("abc123abc123".to_string(), "def456def456".to_string());
        assert_eq!(edge.key(), "abc123abc123:def456def456");
    }

    #[test]
    fn test_commit_record_display() {
        let record = CommitRecord::new(
            "abc123abc123".to_string(),
            "Fix off-by-one".to_string(),
            "0011223344".to_string(),
        );
        assert_eq!(record.to_string(), "abc123abc123 Fix off-by-one");
    }
}
