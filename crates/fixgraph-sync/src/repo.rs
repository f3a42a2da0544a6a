//! Git repository access for the sync pipeline

use fixgraph_core::{VcsError, SHA_ABBREV_LEN};
use git2::{Oid, Repository, Sort};
use std::path::{Path, PathBuf};

/// One commit as read from the log: abbreviated identifier plus the
/// one-line summary. `description` is `None` when the summary is not
/// valid UTF-8.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub sha: String,
    pub description: Option<String>,
}

/// Handle on the local clone of the tracked repository
pub struct GitRepo {
    pub(crate) repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Opens the local clone at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VcsError> {
        let repo = Repository::open(path.as_ref()).map_err(|e| {
            VcsError::Unavailable(format!(
                "failed to open repository at {:?}: {}",
                path.as_ref(),
                e.message()
            ))
        })?;
        Ok(Self {
            repo,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Updates the local clone to the latest remote state of the tracked
    /// branch. Failure here is fatal to a sync run: nothing may be
    /// ingested from a clone that could not be brought up to date.
    pub fn fetch(&self) -> Result<(), VcsError> {
        let output = std::process::Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .arg("pull")
            .arg("--ff-only")
            .arg("--quiet")
            .output()
            .map_err(|e| VcsError::Unavailable(format!("failed to run git pull: {}", e)))?;

        if !output.status.success() {
            return Err(VcsError::Unavailable(format!(
                "git pull failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Resolves a rev (branch name, tag, sha prefix) to a commit oid
    fn resolve_commit(&self, rev: &str) -> Result<Oid, VcsError> {
        let object = self
            .repo
            .revparse_single(rev)
            .map_err(|_| VcsError::NotFound(rev.to_string()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| VcsError::NotFound(rev.to_string()))?;
        Ok(commit.id())
    }

    /// Normalizes an arbitrary hex token to the fixed-length abbreviated
    /// identifier, iff the token resolves to a commit in history.
    ///
    /// Unresolvable tokens are a frequent, expected outcome on real
    /// histories (truncated or corrupted Fixes tags, references into
    /// other repositories), so this returns `None` rather than an error.
    pub fn canonicalize(&self, token: &str) -> Option<String> {
        if token.len() < 4 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let object = self.repo.revparse_single(token).ok()?;
        let commit = object.peel_to_commit().ok()?;
        Some(abbrev(commit.id()))
    }

    /// Returns the full commit message, `None` if it is not valid UTF-8
    pub fn message(&self, rev: &str) -> Result<Option<String>, VcsError> {
        let oid = self.resolve_commit(rev)?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|_| VcsError::NotFound(rev.to_string()))?;
        Ok(commit.message().map(str::to_string))
    }

    /// Computes the content-derived identifier for a commit
    pub fn patch_id(&self, rev: &str) -> Result<String, VcsError> {
        crate::patch_id::patch_id(&self.repo, rev)
    }

    /// Lists commits strictly after `since` up to the tip of `branch`,
    /// oldest first, skipping merges. Each call re-queries the repository
    /// fresh; the walk is finite and not restartable.
    ///
    /// With `since` absent (first-ever run and no configured root) the
    /// walk covers the branch's entire history.
    pub fn commits_since(
        &self,
        branch: &str,
        since: Option<&str>,
    ) -> Result<CommitWalk<'_>, VcsError> {
        let tip = self.resolve_commit(branch).map_err(|_| {
            VcsError::Unavailable(format!("branch {} not found in repository", branch))
        })?;

        let mut walk = self
            .repo
            .revwalk()
            .map_err(|e| VcsError::Unavailable(e.message().to_string()))?;
        walk.push(tip)
            .map_err(|e| VcsError::Unavailable(e.message().to_string()))?;

        if let Some(since) = since {
            let boundary = self.resolve_commit(since).map_err(|_| {
                VcsError::Unavailable(format!("start boundary {} not found in history", since))
            })?;
            walk.hide(boundary)
                .map_err(|e| VcsError::Unavailable(e.message().to_string()))?;
        }

        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
            .map_err(|e| VcsError::Unavailable(e.message().to_string()))?;

        Ok(CommitWalk {
            repo: &self.repo,
            walk,
        })
    }
}

/// Abbreviates a full oid to the system-wide fixed length
pub(crate) fn abbrev(oid: Oid) -> String {
    oid.to_string()[..SHA_ABBREV_LEN].to_string()
}

/// Lazy, ordered, finite walk over new commits of one branch
pub struct CommitWalk<'repo> {
    repo: &'repo Repository,
    walk: git2::Revwalk<'repo>,
}

impl Iterator for CommitWalk<'_> {
    type Item = Result<CommitSummary, VcsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let oid = match self.walk.next()? {
                Ok(oid) => oid,
                Err(e) => return Some(Err(VcsError::Unavailable(e.message().to_string()))),
            };
            let commit = match self.repo.find_commit(oid) {
                Ok(commit) => commit,
                Err(e) => return Some(Err(VcsError::Unavailable(e.message().to_string()))),
            };
            // --no-merges
            if commit.parent_count() > 1 {
                continue;
            }
            return Some(Ok(CommitSummary {
                sha: abbrev(oid),
                description: commit.summary().map(str::to_string),
            }));
        }
    }
}
