//! Fix-relation extraction from commit messages

use anyhow::{Context, Result};
use fixgraph_core::FixEdge;
use fixgraph_db::FixStore;
use regex::Regex;

use crate::repo::GitRepo;

/// De-duplication policy between a Fixes-tag edge and a revert edge that
/// resolve to the same target commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevertDedup {
    /// Drop the revert edge whenever any Fixes tag in the same commit
    /// body already produced an edge to the same target.
    #[default]
    PerCommit,
    /// Drop the revert edge only when the matching Fixes tag sits on the
    /// same message line.
    SameLineOnly,
}

/// Result of scanning one commit body: resolved edge candidates in line
/// order, plus one diagnostic per dropped reference.
#[derive(Debug, Default)]
pub struct Extraction {
    pub edges: Vec<FixEdge>,
    pub diagnostics: Vec<String>,
}

/// Parses commit message bodies for structured references to earlier
/// commits. Reads the commit table for the description fallback; never
/// writes anything itself.
pub struct FixExtractor {
    fixes_re: Regex,
    title_re: Regex,
    revert_re: Regex,
    dedup: RevertDedup,
}

/// One reference found in the body, already resolved to a known sha
struct Candidate {
    line_no: usize,
    is_revert: bool,
    fixed_sha: String,
}

impl FixExtractor {
    pub fn new(dedup: RevertDedup) -> Result<Self> {
        let fixes_re = Regex::new(r"^\s*Fixes: (?:commit )*([0-9a-f]+)")
            .context("Failed to compile fixes regex")?;
        let title_re =
            Regex::new(r#".* \("([^"]+)"\)"#).context("Failed to compile title regex")?;
        let revert_re = Regex::new(r"^\s*This reverts commit ([0-9a-f]+)")
            .context("Failed to compile revert regex")?;

        Ok(Self {
            fixes_re,
            title_re,
            revert_re,
            dedup,
        })
    }

    /// Scans `body` line by line for Fixes tags and revert notices and
    /// resolves each raw token to the canonical abbreviated identifier.
    ///
    /// A Fixes token that does not canonicalize falls back to the quoted
    /// title on the same line, looked up against the commit table; a
    /// revert token that does not canonicalize is dropped outright. Both
    /// drops produce a diagnostic, not an error.
    pub fn extract(
        &self,
        repo: &GitRepo,
        store: &FixStore,
        sha: &str,
        body: &str,
    ) -> Result<Extraction> {
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut diagnostics: Vec<String> = Vec::new();

        for (line_no, line) in body.lines().enumerate() {
            if let Some(caps) = self.fixes_re.captures(line) {
                let token = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                match self.resolve_fixes_token(repo, store, sha, line, token)? {
                    Some(fixed_sha) => {
                        log::info!("Commit {} fixed by {}", fixed_sha, sha);
                        candidates.push(Candidate {
                            line_no,
                            is_revert: false,
                            fixed_sha,
                        });
                    }
                    None => {
                        let msg = format!(
                            "commit {}: Fixes reference {:?} does not resolve, edge dropped",
                            sha,
                            line.trim()
                        );
                        log::warn!("{}", msg);
                        diagnostics.push(msg);
                    }
                }
            }

            if let Some(caps) = self.revert_re.captures(line) {
                let token = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                match repo.canonicalize(token) {
                    Some(fixed_sha) => {
                        log::info!("Commit {} reverted by {}", fixed_sha, sha);
                        candidates.push(Candidate {
                            line_no,
                            is_revert: true,
                            fixed_sha,
                        });
                    }
                    None => {
                        // The revert message format may be wrong; no
                        // fallback is attempted for reverts.
                        let msg = format!(
                            "commit {}: reverted commit {} not found, edge dropped",
                            sha, token
                        );
                        log::warn!("{}", msg);
                        diagnostics.push(msg);
                    }
                }
            }
        }

        let edges = self.dedup_candidates(sha, candidates);
        Ok(Extraction { edges, diagnostics })
    }

    /// Canonicalizes a Fixes token, falling back to the quoted title on
    /// the same line when the token is stale or malformed
    fn resolve_fixes_token(
        &self,
        repo: &GitRepo,
        store: &FixStore,
        sha: &str,
        line: &str,
        token: &str,
    ) -> Result<Option<String>> {
        if let Some(fixed_sha) = repo.canonicalize(token) {
            return Ok(Some(fixed_sha));
        }

        // The Fixes: tag may be wrong. The sha may not be in the tracked
        // history, or the token may not be a sha in the first place. Try
        // the commit title instead.
        log::warn!("Commit {}: Fixes token {} not found in history", sha, token);
        let Some(title) = self.title_re.captures(line).and_then(|c| c.get(1)) else {
            return Ok(None);
        };
        let found = store.lookup_sha_by_description(title.as_str())?;
        if let Some(ref fixed_sha) = found {
            log::info!("  Description matches with sha {}", fixed_sha);
        }
        Ok(found)
    }

    /// Applies the revert de-duplication policy, keeping the Fixes-tag
    /// edge when both kinds resolved to the same target
    fn dedup_candidates(&self, sha: &str, candidates: Vec<Candidate>) -> Vec<FixEdge> {
        let mut edges = Vec::new();
        for candidate in &candidates {
            if candidate.is_revert {
                let covered = candidates.iter().any(|other| {
                    !other.is_revert
                        && other.fixed_sha == candidate.fixed_sha
                        && match self.dedup {
                            RevertDedup::PerCommit => true,
                            RevertDedup::SameLineOnly => other.line_no == candidate.line_no,
                        }
                });
                if covered {
                    log::debug!(
                        "Commit {}: revert of {} already covered by a Fixes tag",
                        sha,
                        candidate.fixed_sha
                    );
                    continue;
                }
            }
            edges.push(FixEdge::new(candidate.fixed_sha.clone(), sha.to_string()));
        }
        edges
    }
}
