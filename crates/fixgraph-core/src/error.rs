//! Error types for fixgraph-core

/// Errors raised by the version-control collaborator
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// The repository cannot be reached, updated, or queried. Fatal to a
    /// sync run; nothing is committed.
    #[error("Version control unavailable: {0}")]
    Unavailable(String),

    /// A rev or token does not resolve to a commit in the tracked
    /// history. Expected per-item outcome, recoverable by the caller.
    #[error("Commit not found: {0}")]
    NotFound(String),
}
