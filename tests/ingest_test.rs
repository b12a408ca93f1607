//! End-to-end ingestion tests
//!
//! Builds real git repositories with git2 in temp directories, ingests them
//! through `IngestService`, and checks what the analyzers report. Runs
//! against both the in-memory and the on-disk store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use churnwatch::analytics::CouplingQuery;
use churnwatch::git::GitHistorySource;
use churnwatch::mining::{IngestService, IngestState};
use churnwatch::models::RunResult;
use churnwatch::store::{MemoryStore, RedbStore};
use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    repo: Repository,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let repo = Repository::init(&root).unwrap();
        Self { _dir: dir, root, repo }
    }

    /// Repository in a subdirectory called `name`
    fn named(name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(name);
        let repo = Repository::init(&root).unwrap();
        Self { _dir: dir, root, repo }
    }

    fn path(&self) -> &str {
        self.root.to_str().unwrap()
    }

    /// Write files (None deletes) and commit as `author`.
    fn commit(&self, author: &str, files: &[(&str, Option<&str>)]) -> Oid {
        let mut index = self.repo.index().unwrap();
        for (name, content) in files {
            let full = self.root.join(name);
            match content {
                Some(content) => {
                    if let Some(parent) = full.parent() {
                        std::fs::create_dir_all(parent).unwrap();
                    }
                    std::fs::write(&full, content).unwrap();
                    index.add_path(Path::new(name)).unwrap();
                }
                None => {
                    std::fs::remove_file(&full).unwrap();
                    index.remove_path(Path::new(name)).unwrap();
                }
            }
        }
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now(author, &format!("{}@example.com", author)).unwrap();
        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, "change", &tree, &parent_refs)
            .unwrap()
    }
}

fn memory_service(scratch: &Path) -> IngestService {
    let store = Arc::new(MemoryStore::new());
    IngestService::new(store.clone(), store, Arc::new(GitHistorySource::new(scratch)))
}

/// Five commits: `a.rs` and `b.rs` move together four times.
fn coupled_history(fx: &Fixture) -> Oid {
    fx.commit("ana", &[("a.rs", Some("1\n")), ("b.rs", Some("1\n"))]);
    fx.commit("ana", &[("a.rs", Some("1\n2\n")), ("b.rs", Some("1\n2\n"))]);
    fx.commit("bo", &[("a.rs", Some("1\n2\n3\n")), ("b.rs", Some("1\n2\n3\n"))]);
    fx.commit("ana", &[("a.rs", Some("1\n2\n3\n4\n")), ("b.rs", Some("1\n2\n3\n4\n"))]);
    fx.commit("bo", &[("b.rs", Some("1\n2\n3\n4\n5\n")), ("c.rs", Some("x\n"))])
}

#[test]
fn test_full_ingest_then_analyze() {
    let fx = Fixture::new();
    let head = coupled_history(&fx);
    let scratch = tempfile::tempdir().unwrap();
    let svc = memory_service(scratch.path());

    let outcome = svc.start_full("demo", fx.path()).unwrap().join().unwrap();
    assert_eq!(outcome.state, IngestState::Completed);
    assert_eq!(outcome.stats.commit_count, 5);
    assert_eq!(outcome.stats.change_count, 10);
    assert_eq!(outcome.stats.file_count, 3);
    assert_eq!(outcome.last_commit_hash.unwrap().as_str(), head.to_string());

    let hotspots = svc.hotspots("demo", 0).unwrap();
    assert_eq!(hotspots[0].file_path.as_str(), "b.rs");
    assert_eq!(hotspots[0].change_count, 5);
    assert_eq!(hotspots[0].total_added, 5);

    let pairs = svc.coupling("demo", &CouplingQuery::default()).unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].file_a.as_str(), "a.rs");
    assert_eq!(pairs[0].file_b.as_str(), "b.rs");
    assert_eq!(pairs[0].shared_commits, 4);
    assert!((pairs[0].coupling_score - 1.0).abs() < 1e-9);

    let authors = svc.author_breakdown("demo", 0).unwrap();
    assert_eq!(authors[0].author, "ana");
    assert_eq!(authors[0].commit_count, 3);

    let owners = svc.file_ownership("demo", 0).unwrap();
    assert_eq!(owners[0].file_path.as_str(), "c.rs");
    assert_eq!(owners[0].top_author, "bo");
}

#[test]
fn test_incremental_ingest_only_adds_new_commits() {
    let fx = Fixture::new();
    fx.commit("ana", &[("a.rs", Some("1\n"))]);
    fx.commit("ana", &[("a.rs", Some("1\n2\n"))]);
    let scratch = tempfile::tempdir().unwrap();
    let svc = memory_service(scratch.path());

    svc.start_incremental("demo", fx.path()).unwrap().join().unwrap();

    // Nothing new: a no-op
    let noop = svc.start_incremental("demo", fx.path()).unwrap().join().unwrap();
    assert_eq!(noop.stats.commit_count, 0);
    assert_eq!(noop.stats.change_count, 0);

    let head = fx.commit("bo", &[("b.rs", Some("new\n")), ("a.rs", None)]);
    let outcome = svc.start_incremental("demo", fx.path()).unwrap().join().unwrap();
    assert_eq!(outcome.stats.commit_count, 1);
    assert_eq!(outcome.stats.change_count, 2);
    assert_eq!(outcome.last_commit_hash.unwrap().as_str(), head.to_string());

    let status = svc.status("demo").unwrap();
    assert_eq!(status.change_count, 4);
    assert_eq!(status.file_count, 2);
}

#[test]
fn test_redb_store_keeps_history_across_reopen() {
    let fx = Fixture::new();
    coupled_history(&fx);
    let data = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(RedbStore::new(data.path()).unwrap());
        let svc = IngestService::new(
            store.clone(),
            store,
            Arc::new(GitHistorySource::new(scratch.path())),
        );
        svc.start_full("demo", fx.path()).unwrap().join().unwrap();
    }

    let head = fx.commit("cy", &[("d.rs", Some("d\n"))]);
    let store = Arc::new(RedbStore::new(data.path()).unwrap());
    let svc = IngestService::new(
        store.clone(),
        store,
        Arc::new(GitHistorySource::new(scratch.path())),
    );

    let status = svc.status("demo").unwrap();
    assert!(status.is_analyzed);
    assert_eq!(status.change_count, 10);

    let outcome = svc.start_incremental("demo", fx.path()).unwrap().join().unwrap();
    assert_eq!(outcome.stats.commit_count, 1);
    assert_eq!(outcome.last_commit_hash.unwrap().as_str(), head.to_string());
    assert_eq!(svc.status("demo").unwrap().file_count, 4);
}

#[test]
fn test_ingest_of_missing_repository_fails() {
    let scratch = tempfile::tempdir().unwrap();
    let svc = memory_service(scratch.path());
    let not_a_repo = tempfile::tempdir().unwrap();

    let err = svc
        .start_full("demo", not_a_repo.path().to_str().unwrap())
        .unwrap()
        .join()
        .unwrap_err();
    assert!(!err.is_transient());
    // The slot is released even though the job failed
    assert!(!svc.registry().is_running("demo"));
}

#[test]
fn test_failure_is_visible_after_handle_is_dropped() {
    let scratch = tempfile::tempdir().unwrap();
    let svc = memory_service(scratch.path());
    let not_a_repo = tempfile::tempdir().unwrap();

    drop(svc.start_full("demo", not_a_repo.path().to_str().unwrap()).unwrap());
    let deadline = Instant::now() + Duration::from_secs(30);
    while svc.registry().is_running("demo") {
        assert!(Instant::now() < deadline, "worker never finished");
        std::thread::sleep(Duration::from_millis(10));
    }

    let status = svc.status("demo").unwrap();
    assert!(!status.is_analyzed);
    assert!(!status.job_running);
    let last = status.last_run.expect("failed run should be recorded");
    assert_eq!(last.result, RunResult::Failed);
    assert!(last.error.is_some());
}

#[test]
fn test_clone_over_file_url() {
    let fx = Fixture::new();
    coupled_history(&fx);
    let scratch = tempfile::tempdir().unwrap();
    let svc = memory_service(scratch.path());
    let url = format!("file://{}", fx.path());

    let outcome = svc.start_full("mirror", &url).unwrap().join().unwrap();
    assert_eq!(outcome.stats.commit_count, 5);

    let head = fx.commit("bo", &[("e.rs", Some("e\n"))]);
    let outcome = svc.start_incremental("mirror", &url).unwrap().join().unwrap();
    assert_eq!(outcome.stats.commit_count, 1);
    assert_eq!(outcome.last_commit_hash.unwrap().as_str(), head.to_string());
}

#[test]
fn test_same_named_remotes_do_not_share_a_mirror() {
    let first = Fixture::named("app");
    first.commit("ana", &[("one.rs", Some("1\n"))]);
    let second = Fixture::named("app");
    second.commit("bo", &[("two.rs", Some("2\n"))]);
    second.commit("bo", &[("two.rs", Some("2\n3\n"))]);

    let scratch = tempfile::tempdir().unwrap();
    let svc = memory_service(scratch.path());
    let first_url = format!("file://{}", first.path());
    let second_url = format!("file://{}", second.path());

    let outcome = svc.start_full("first", &first_url).unwrap().join().unwrap();
    assert_eq!(outcome.stats.commit_count, 1);
    let outcome = svc.start_full("second", &second_url).unwrap().join().unwrap();
    assert_eq!(outcome.stats.commit_count, 2);

    // The first mirror was not replaced by the second clone
    first.commit("ana", &[("one.rs", Some("1\n2\n"))]);
    let outcome = svc.start_incremental("first", &first_url).unwrap().join().unwrap();
    assert_eq!(outcome.state, IngestState::Completed);
    assert_eq!(outcome.stats.commit_count, 1);

    let mirrors = std::fs::read_dir(scratch.path()).unwrap().count();
    assert_eq!(mirrors, 2);
    assert_eq!(svc.hotspots("first", 0).unwrap()[0].file_path.as_str(), "one.rs");
    assert_eq!(svc.hotspots("second", 0).unwrap()[0].file_path.as_str(), "two.rs");
}
