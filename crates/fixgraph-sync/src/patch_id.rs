//! Content-derived commit identification

use data_encoding::HEXLOWER;
use fixgraph_core::VcsError;
use git2::{DiffFormat, DiffOptions, Repository};
use sha2::{Digest, Sha256};

/// Computes a stable content identifier for a commit.
///
/// The identifier is a SHA-256 over the commit's diff against its first
/// parent (the empty tree for a root commit): file paths plus added and
/// removed line content. Hunk headers and context lines are excluded, so
/// the same logical change keeps the same identifier across rebases,
/// cherry-picks, and backports that only shift line offsets.
pub fn patch_id(repo: &Repository, rev: &str) -> Result<String, VcsError> {
    let object = repo
        .revparse_single(rev)
        .map_err(|_| VcsError::NotFound(rev.to_string()))?;
    let commit = object
        .peel_to_commit()
        .map_err(|_| VcsError::NotFound(rev.to_string()))?;

    let tree = commit
        .tree()
        .map_err(|e| VcsError::Unavailable(e.message().to_string()))?;
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(
            parent
                .tree()
                .map_err(|e| VcsError::Unavailable(e.message().to_string()))?,
        ),
        Err(_) => None,
    };

    let mut opts = DiffOptions::new();
    opts.ignore_whitespace_eol(true);
    let diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))
        .map_err(|e| VcsError::Unavailable(e.message().to_string()))?;

    let mut hasher = Sha256::new();
    diff.print(DiffFormat::Patch, |delta, _hunk, line| {
        match line.origin() {
            '+' | '-' => {
                hasher.update([line.origin() as u8]);
                hasher.update(line.content());
            }
            'F' => {
                // File header: hash the paths, never the index line with
                // its parent-dependent blob ids
                if let Some(path) = delta.old_file().path() {
                    hasher.update(path.to_string_lossy().as_bytes());
                }
                if let Some(path) = delta.new_file().path() {
                    hasher.update(path.to_string_lossy().as_bytes());
                }
            }
            _ => {}
        }
        true
    })
    .map_err(|e| VcsError::Unavailable(e.message().to_string()))?;

    Ok(HEXLOWER.encode(&hasher.finalize()))
}
