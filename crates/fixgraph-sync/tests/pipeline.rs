//! End-to-end tests for the sync pipeline
//!
//! Each test builds a throwaway git repository with git2 and runs the
//! pipeline against a throwaway database, so the whole chain (walk,
//! content id, extraction, persistence, watermark) is exercised for
//! real.

use fixgraph_core::SHA_ABBREV_LEN;
use fixgraph_db::FixStore;
use fixgraph_sync::{GitRepo, RevertDedup, SyncOptions, Syncer};
use git2::{Oid, Repository, Signature, Time};
use std::path::Path;
use tempfile::TempDir;

// ── fixtures ─────────────────────────────────────────────────────────────────

struct Fixture {
    repo_dir: TempDir,
    db_dir: TempDir,
    repo: Repository,
    clock: i64,
}

impl Fixture {
    fn new() -> Self {
        let repo_dir = TempDir::new().unwrap();
        let repo = Repository::init(repo_dir.path()).unwrap();
        Self {
            repo_dir,
            db_dir: TempDir::new().unwrap(),
            repo,
            clock: 1_600_000_000,
        }
    }

    fn signature(&self) -> Signature<'static> {
        Signature::new("Dev", "dev@example.com", &Time::new(self.clock, 0)).unwrap()
    }

    /// Commits a file change on HEAD and returns the full sha
    fn commit(&mut self, path: &str, content: &str, message: &str) -> String {
        self.clock += 60;
        let sig = self.signature();
        std::fs::write(self.repo.workdir().unwrap().join(path), content).unwrap();
        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }

    /// Commits a file change on top of an arbitrary parent without
    /// moving HEAD; used to fabricate cherry-picks and side branches
    fn commit_detached(&mut self, parent: &str, path: &str, content: &str, message: &str) -> String {
        self.clock += 60;
        let sig = self.signature();
        let parent_commit = self
            .repo
            .find_commit(Oid::from_str(parent).unwrap())
            .unwrap();
        let blob = self.repo.blob(content.as_bytes()).unwrap();
        let mut builder = self
            .repo
            .treebuilder(Some(&parent_commit.tree().unwrap()))
            .unwrap();
        builder.insert(path, blob, 0o100644).unwrap();
        let tree = self.repo.find_tree(builder.write().unwrap()).unwrap();
        self.repo
            .commit(None, &sig, &sig, message, &tree, &[&parent_commit])
            .unwrap()
            .to_string()
    }

    /// Creates a two-parent merge of HEAD and `other` on HEAD
    fn merge(&mut self, other: &str, message: &str) -> String {
        self.clock += 60;
        let sig = self.signature();
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        let other_commit = self.repo.find_commit(Oid::from_str(other).unwrap()).unwrap();
        let tree = head.tree().unwrap();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head, &other_commit])
            .unwrap()
            .to_string()
    }

    fn syncer(&self) -> Syncer {
        self.syncer_with(SyncOptions {
            fetch: false,
            ..SyncOptions::default()
        })
    }

    fn syncer_with(&self, options: SyncOptions) -> Syncer {
        let repo = GitRepo::open(self.repo_dir.path()).unwrap();
        let store = FixStore::open(self.db_dir.path()).unwrap();
        Syncer::new(repo, store, options).unwrap()
    }
}

fn short(sha: &str) -> String {
    sha[..SHA_ABBREV_LEN].to_string()
}

// ── ingestion and watermark ──────────────────────────────────────────────────

#[test]
fn test_first_run_ingests_history_and_sets_watermark() {
    let mut fx = Fixture::new();
    fx.commit("a.txt", "one\n", "Add a");
    let tip = fx.commit("a.txt", "two\n", "Tune a");

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.commits_read, 2);
    assert_eq!(stats.nodes_inserted, 2);
    assert_eq!(stats.duplicates, 0);
    assert!(stats.diagnostics.is_empty());

    let store = syncer.store();
    assert_eq!(store.commit_count(), 2);
    assert_eq!(
        store.read_watermark("HEAD").unwrap().unwrap().last_sha,
        short(&tip)
    );
}

#[test]
fn test_second_run_is_idempotent() {
    let mut fx = Fixture::new();
    fx.commit("a.txt", "one\n", "Add a");
    let sha1 = fx.commit("a.txt", "two\n", "Fix a");
    fx.commit(
        "a.txt",
        "three\n",
        &format!("Fix the fix\n\nFixes: {} (\"Fix a\")\n", sha1),
    );

    let syncer = fx.syncer();
    let first = syncer.run("HEAD").unwrap();
    let mark_after_first = syncer.store().read_watermark("HEAD").unwrap().unwrap();
    let second = syncer.run("HEAD").unwrap();

    assert_eq!(first.nodes_inserted, 3);
    assert_eq!(first.edges_inserted, 1);

    // Nothing past the watermark: the second run must not touch anything
    assert_eq!(second.commits_read, 0);
    assert_eq!(second.nodes_inserted, 0);
    assert_eq!(second.edges_inserted, 0);

    let store = syncer.store();
    assert_eq!(store.commit_count(), 3);
    assert_eq!(store.edge_count(), 1);
    assert_eq!(
        store.read_watermark("HEAD").unwrap().unwrap().last_sha,
        mark_after_first.last_sha
    );
}

#[test]
fn test_overlapping_rerun_recovers_duplicates_silently() {
    let mut fx = Fixture::new();
    let sha1 = fx.commit("a.txt", "one\n", "Add a");
    let tip = fx.commit("a.txt", "two\n", "Tune a");

    let syncer = fx.syncer();
    syncer.run("HEAD").unwrap();

    // Rewind the watermark to simulate a second invocation that read the
    // same range (two concurrent runs sharing a stale watermark)
    syncer
        .store()
        .write_watermark("HEAD", &short(&sha1), 0)
        .unwrap();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.commits_read, 1);
    assert_eq!(stats.nodes_inserted, 0);
    assert_eq!(stats.duplicates, 1);
    assert!(stats.diagnostics.is_empty());

    let store = syncer.store();
    assert_eq!(store.commit_count(), 2);
    assert_eq!(
        store.read_watermark("HEAD").unwrap().unwrap().last_sha,
        short(&tip)
    );
}

#[test]
fn test_incremental_run_picks_up_only_new_commits() {
    let mut fx = Fixture::new();
    fx.commit("a.txt", "one\n", "Add a");

    let syncer = fx.syncer();
    syncer.run("HEAD").unwrap();
    drop(syncer);

    let sha2 = fx.commit("a.txt", "two\n", "Tune a");
    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.commits_read, 1);
    assert_eq!(stats.nodes_inserted, 1);
    assert_eq!(
        syncer.store().read_watermark("HEAD").unwrap().unwrap().last_sha,
        short(&sha2)
    );
}

#[test]
fn test_max_commits_bounds_run_and_next_run_resumes() {
    let mut fx = Fixture::new();
    fx.commit("a.txt", "one\n", "Add a");
    let sha2 = fx.commit("a.txt", "two\n", "Tune a");
    fx.commit("a.txt", "three\n", "Polish a");

    let syncer = fx.syncer_with(SyncOptions {
        fetch: false,
        max_commits: Some(2),
        ..SyncOptions::default()
    });
    let stats = syncer.run("HEAD").unwrap();
    assert_eq!(stats.commits_read, 2);
    assert_eq!(
        syncer.store().read_watermark("HEAD").unwrap().unwrap().last_sha,
        short(&sha2)
    );
    drop(syncer);

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();
    assert_eq!(stats.commits_read, 1);
    assert_eq!(syncer.store().commit_count(), 3);
}

#[test]
fn test_root_option_bounds_first_run() {
    let mut fx = Fixture::new();
    let root = fx.commit("a.txt", "one\n", "Add a");
    fx.commit("a.txt", "two\n", "Tune a");

    let syncer = fx.syncer_with(SyncOptions {
        fetch: false,
        root: Some(root.clone()),
        ..SyncOptions::default()
    });
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.commits_read, 1);
    assert!(syncer.store().get_commit(&short(&root)).unwrap().is_none());
}

#[test]
fn test_merge_commits_are_not_ingested() {
    let mut fx = Fixture::new();
    let base = fx.commit("a.txt", "one\n", "Add a");
    let side = fx.commit_detached(&base, "b.txt", "side\n", "Add b on side");
    fx.commit("a.txt", "two\n", "Tune a");
    let merge = fx.merge(&side, "Merge side branch");

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.commits_read, 3);
    assert!(syncer.store().get_commit(&short(&merge)).unwrap().is_none());
}

// ── fix edges ────────────────────────────────────────────────────────────────

#[test]
fn test_fixes_tag_resolves_full_hash_to_abbreviated_edge() {
    let mut fx = Fixture::new();
    let fixed = fx.commit("a.txt", "one\n", "Fix off-by-one");
    let fixing = fx.commit(
        "a.txt",
        "two\n",
        &format!("Fix the fix\n\nFixes: {} (\"Fix off-by-one\")\n", fixed),
    );

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.edges_found, 1);
    assert_eq!(stats.edges_inserted, 1);

    let edges = syncer.store().fixes_for(&short(&fixed)).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].fixed_sha, short(&fixed));
    assert_eq!(edges[0].fixing_sha, short(&fixing));
}

#[test]
fn test_fixes_tag_falls_back_to_description_lookup() {
    let mut fx = Fixture::new();
    let fixed = fx.commit("a.txt", "one\n", "Fix off-by-one");
    let fixing = fx.commit(
        "a.txt",
        "two\n",
        // Token from another repository: not resolvable here, but the
        // quoted title matches a commit ingested earlier in this run
        "Fix the fix\n\nFixes: badbadbadbad (\"Fix off-by-one\")\n",
    );

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.edges_inserted, 1);
    let edges = syncer.store().fixes_for(&short(&fixed)).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].fixing_sha, short(&fixing));
}

#[test]
fn test_fixes_tag_without_match_is_dropped_with_diagnostic() {
    let mut fx = Fixture::new();
    fx.commit("a.txt", "one\n", "Add a");
    fx.commit(
        "a.txt",
        "two\n",
        "Fix nothing\n\nFixes: badbadbadbad (\"No such title\")\n",
    );

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.edges_found, 0);
    assert_eq!(syncer.store().edge_count(), 0);
    assert_eq!(stats.diagnostics.len(), 1);
}

#[test]
fn test_revert_creates_edge() {
    let mut fx = Fixture::new();
    let reverted = fx.commit("a.txt", "one\n", "Add a");
    let reverting = fx.commit(
        "a.txt",
        "",
        &format!("Revert \"Add a\"\n\nThis reverts commit {}.\n", reverted),
    );

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.edges_inserted, 1);
    let edges = syncer.store().fixes_for(&short(&reverted)).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].fixing_sha, short(&reverting));
}

#[test]
fn test_unresolvable_revert_is_dropped_and_run_commits() {
    let mut fx = Fixture::new();
    fx.commit("a.txt", "one\n", "Add a");
    let tip = fx.commit(
        "a.txt",
        "two\n",
        "Revert something\n\nThis reverts commit ffffffffffffffffffffffffffffffffffffffff.\n",
    );

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.edges_found, 0);
    assert_eq!(stats.diagnostics.len(), 1);
    assert_eq!(syncer.store().edge_count(), 0);
    // The malformed message never aborts the run
    assert_eq!(
        syncer.store().read_watermark("HEAD").unwrap().unwrap().last_sha,
        short(&tip)
    );
}

#[test]
fn test_fixes_and_revert_of_same_target_are_deduplicated() {
    let mut fx = Fixture::new();
    let fixed = fx.commit("a.txt", "one\n", "Add a");
    fx.commit(
        "a.txt",
        "two\n",
        &format!(
            "Back out\n\nFixes: {} (\"Add a\")\n\nThis reverts commit {}.\n",
            fixed, fixed
        ),
    );

    let syncer = fx.syncer();
    let stats = syncer.run("HEAD").unwrap();

    // The revert carries no information beyond the Fixes tag
    assert_eq!(stats.edges_found, 1);
    assert!(stats.diagnostics.is_empty());
    assert_eq!(syncer.store().fixes_for(&short(&fixed)).unwrap().len(), 1);
}

#[test]
fn test_same_line_policy_keeps_candidates_from_separate_lines() {
    let mut fx = Fixture::new();
    let fixed = fx.commit("a.txt", "one\n", "Add a");
    fx.commit(
        "a.txt",
        "two\n",
        &format!(
            "Back out\n\nFixes: {} (\"Add a\")\n\nThis reverts commit {}.\n",
            fixed, fixed
        ),
    );

    let syncer = fx.syncer_with(SyncOptions {
        fetch: false,
        dedup: RevertDedup::SameLineOnly,
        ..SyncOptions::default()
    });
    let stats = syncer.run("HEAD").unwrap();

    // Both candidates survive under the narrow policy; the store still
    // keeps a single row for the identical edge
    assert_eq!(stats.edges_found, 2);
    assert_eq!(syncer.store().fixes_for(&short(&fixed)).unwrap().len(), 1);
}

#[test]
fn test_edge_to_commit_outside_tracked_range_is_dropped() {
    let mut fx = Fixture::new();
    let early = fx.commit("a.txt", "one\n", "Add a");
    fx.commit(
        "a.txt",
        "two\n",
        &format!("Fix a\n\nFixes: {} (\"Add a\")\n", early),
    );

    // Root excludes the referenced commit, so it is in git history but
    // never lands in the commit table
    let syncer = fx.syncer_with(SyncOptions {
        fetch: false,
        root: Some(early.clone()),
        ..SyncOptions::default()
    });
    let stats = syncer.run("HEAD").unwrap();

    assert_eq!(stats.edges_found, 1);
    assert_eq!(stats.edges_inserted, 0);
    assert!(stats
        .diagnostics
        .iter()
        .any(|d| d.contains(&short(&early))));
    assert_eq!(syncer.store().edge_count(), 0);
}

// ── content identifier ───────────────────────────────────────────────────────

#[test]
fn test_patch_id_stable_across_cherry_pick() {
    let mut fx = Fixture::new();
    let base = fx.commit("a.txt", "one\n", "Add a");
    let original = fx.commit("a.txt", "two\n", "Tune a");
    let backport = fx.commit_detached(&base, "a.txt", "two\n", "Backport: tune a");

    let repo = GitRepo::open(fx.repo_dir.path()).unwrap();
    let id_original = repo.patch_id(&original).unwrap();
    let id_backport = repo.patch_id(&backport).unwrap();

    assert_ne!(short(&original), short(&backport));
    assert_eq!(id_original, id_backport);
}

#[test]
fn test_patch_id_differs_for_different_content() {
    let mut fx = Fixture::new();
    let base = fx.commit("a.txt", "one\n", "Add a");
    let one = fx.commit("a.txt", "two\n", "Tune a");
    let other = fx.commit_detached(&base, "a.txt", "three\n", "Tune a differently");

    let repo = GitRepo::open(fx.repo_dir.path()).unwrap();
    assert_ne!(repo.patch_id(&one).unwrap(), repo.patch_id(&other).unwrap());
}

#[test]
fn test_patch_id_not_found_for_bogus_rev() {
    let mut fx = Fixture::new();
    fx.commit("a.txt", "one\n", "Add a");

    let repo = GitRepo::open(fx.repo_dir.path()).unwrap();
    assert!(repo.patch_id("ffffffffffffffffffffffffffffffffffffffff").is_err());
}

// ── canonicalization ─────────────────────────────────────────────────────────

#[test]
fn test_canonicalize_short_prefix_and_full_hash() {
    let mut fx = Fixture::new();
    let sha = fx.commit("a.txt", "one\n", "Add a");

    let repo = GitRepo::open(fx.repo_dir.path()).unwrap();
    assert_eq!(repo.canonicalize(&sha), Some(short(&sha)));
    assert_eq!(repo.canonicalize(&sha[..8]), Some(short(&sha)));
    assert_eq!(repo.canonicalize("ffffffffffff"), None);
    assert_eq!(repo.canonicalize("not-a-sha"), None);
}
