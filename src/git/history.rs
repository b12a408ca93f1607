//! Git history extraction using libgit2
//!
//! Walks the commit graph once, diffing every commit against its first
//! parent (or the empty tree for root commits) and turning each touched file
//! into a line delta.

use chrono::{TimeZone, Utc};
use git2::{Delta, DiffDelta, DiffOptions, ErrorCode, Oid, Repository, Sort};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::lines::{count_lines, modified_delta};
use super::remote::RepoLocation;
use super::{CommitRecord, FileDelta, HistoryError, HistorySource, Walk};
use crate::jobs::CancelToken;
use crate::models::{FilePath, GitHash};

/// Git history reader over an opened repository.
pub struct GitHistory {
    repo: Repository,
}

impl GitHistory {
    /// Open a git repository.
    ///
    /// # Arguments
    /// * `path` - Path to the repository (or any subdirectory)
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let repo = Repository::discover(path).map_err(|source| HistoryError::RepoOpen {
            location: path.display().to_string(),
            source,
        })?;
        debug!("Opened git repository at {:?}", repo.path());
        Ok(Self { repo })
    }

    /// Check if a path is inside a git repository.
    pub fn is_git_repo(path: &Path) -> bool {
        Repository::discover(path).is_ok()
    }

    /// Hash of the commit HEAD points at, or `None` for an unborn branch.
    pub fn head_hash(&self) -> Result<Option<GitHash>, HistoryError> {
        match self.repo.head() {
            Ok(head) => {
                let oid = head.peel_to_commit()?.id();
                Ok(GitHash::parse(&oid.to_string()).ok())
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk commits reachable from HEAD, newest-first.
    ///
    /// With `since`, that commit and everything reachable from it are hidden.
    /// The token is polled before each commit is diffed.
    pub fn walk(&self, since: Option<&GitHash>, cancel: &CancelToken) -> Result<Walk, HistoryError> {
        let mut walk = Walk::default();

        if self.head_hash()?.is_none() {
            debug!("Repository has no commits yet");
            return Ok(walk);
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push_head()?;

        if let Some(since) = since {
            let oid = Oid::from_str(since.as_str())?;
            if self.repo.find_commit(oid).is_err() {
                return Err(HistoryError::CheckpointNotFound(since.clone()));
            }
            revwalk.hide(oid)?;
        }

        for oid_result in revwalk {
            if cancel.is_cancelled() {
                debug!("Walk cancelled after {} commits", walk.commits.len());
                walk.cancelled = true;
                break;
            }

            let oid = oid_result?;
            let commit = self.repo.find_commit(oid)?;
            let record = self.extract_commit_record(&commit, &mut walk.invalid_paths)?;
            walk.commits.push(record);
        }

        Ok(walk)
    }

    /// Diff a commit against its first parent and collect per-file deltas.
    fn extract_commit_record(
        &self,
        commit: &git2::Commit,
        invalid_paths: &mut usize,
    ) -> Result<CommitRecord, HistoryError> {
        // Shallow boundaries have a parent id but no parent object; diff those
        // against the empty tree like a root commit.
        let parent = commit.parent(0).ok();
        let tree = commit.tree()?;
        let parent_tree = parent.as_ref().map(|p| p.tree()).transpose()?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.include_typechange(true);
        let diff =
            self.repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;

        let mut changes = Vec::with_capacity(diff.deltas().len());
        for delta in diff.deltas() {
            let Some(raw_path) = delta_path(&delta) else {
                continue;
            };
            let file_path = match raw_path.to_str().map(FilePath::new) {
                Some(Ok(p)) => p,
                Some(Err(e)) => {
                    warn!("Skipping path in {}: {}", commit.id(), e);
                    *invalid_paths += 1;
                    continue;
                }
                None => {
                    warn!(
                        "Skipping non-UTF-8 path {:?} in {}",
                        raw_path.display(),
                        commit.id()
                    );
                    *invalid_paths += 1;
                    continue;
                }
            };

            let (lines_added, lines_deleted) = match delta.status() {
                Delta::Added => (self.blob_lines(delta.new_file().id()), 0),
                Delta::Deleted => (0, self.blob_lines(delta.old_file().id())),
                _ => modified_delta(
                    self.blob_lines(delta.old_file().id()),
                    self.blob_lines(delta.new_file().id()),
                ),
            };

            changes.push(FileDelta {
                file_path,
                lines_added,
                lines_deleted,
            });
        }

        let message = commit.message().unwrap_or("").trim_end().to_string();

        Ok(CommitRecord {
            hash: commit.id().to_string(),
            author: commit.author().name().unwrap_or("Unknown").to_string(),
            timestamp: format_git_time(&commit.time()),
            message,
            changes,
        })
    }

    /// Line count of a blob; submodule links and missing objects count as zero.
    fn blob_lines(&self, oid: Oid) -> u64 {
        if oid.is_zero() {
            return 0;
        }
        match self.repo.find_blob(oid) {
            Ok(blob) => count_lines(blob.content()),
            Err(e) => {
                debug!("No blob for {}: {}", oid, e);
                0
            }
        }
    }
}

fn delta_path(delta: &DiffDelta<'_>) -> Option<PathBuf> {
    let file = match delta.status() {
        Delta::Deleted => delta.old_file(),
        _ => delta.new_file(),
    };
    file.path().map(Path::to_path_buf)
}

/// Format a git timestamp as ISO 8601.
fn format_git_time(time: &git2::Time) -> String {
    match Utc.timestamp_opt(time.seconds(), 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => "1970-01-01T00:00:00Z".to_string(),
    }
}

/// [`HistorySource`] backed by libgit2, mirroring remotes under `scratch_dir`.
#[derive(Debug, Clone)]
pub struct GitHistorySource {
    scratch_dir: PathBuf,
}

impl GitHistorySource {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

impl HistorySource for GitHistorySource {
    fn list_commits(
        &self,
        location: &RepoLocation,
        since: Option<&GitHash>,
        cancel: &CancelToken,
    ) -> Result<Walk, HistoryError> {
        let path = location.materialize(&self.scratch_dir)?;
        let history = GitHistory::open(&path)?;
        let walk = history.walk(since, cancel)?;
        debug!(
            "Walked {} commits from {} ({} invalid paths)",
            walk.commits.len(),
            location,
            walk.invalid_paths
        );
        Ok(walk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct TestRepo {
        dir: tempfile::TempDir,
        repo: Repository,
    }

    impl TestRepo {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let repo = Repository::init(dir.path()).unwrap();
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
            Self { dir, repo }
        }

        /// Write files (None deletes) and commit the full worktree state.
        fn commit(&self, files: &[(&str, Option<&str>)], message: &str) -> Oid {
            let mut index = self.repo.index().unwrap();
            for (name, content) in files {
                let full = self.dir.path().join(name);
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
            let tree_id = index.write_tree().unwrap();
            let tree = self.repo.find_tree(tree_id).unwrap();
            let sig = self.repo.signature().unwrap();
            let parents = match self.repo.head() {
                Ok(head) => vec![head.peel_to_commit().unwrap()],
                Err(_) => vec![],
            };
            let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
                .unwrap()
        }

        fn history(&self) -> GitHistory {
            GitHistory::open(self.dir.path()).unwrap()
        }
    }

    fn hash(oid: Oid) -> GitHash {
        GitHash::parse(&oid.to_string()).unwrap()
    }

    #[test]
    fn test_open_repo_and_non_repo() {
        let repo = TestRepo::new();
        assert!(GitHistory::is_git_repo(repo.dir.path()));
        let plain = tempdir().unwrap();
        assert!(!GitHistory::is_git_repo(plain.path()));
        assert!(matches!(
            GitHistory::open(plain.path()),
            Err(HistoryError::RepoOpen { .. })
        ));
    }

    #[test]
    fn test_empty_repo_walks_nothing() {
        let repo = TestRepo::new();
        let walk = repo.history().walk(None, &CancelToken::never()).unwrap();
        assert!(walk.commits.is_empty());
        assert_eq!(repo.history().head_hash().unwrap(), None);
    }

    #[test]
    fn test_root_commit_counts_every_file_as_added() {
        let repo = TestRepo::new();
        repo.commit(
            &[
                ("a.txt", Some("one\ntwo\nthree\n")),
                ("src/b.rs", Some("fn main() {}")),
                ("empty", Some("")),
            ],
            "Initial commit",
        );

        let walk = repo.history().walk(None, &CancelToken::never()).unwrap();
        assert_eq!(walk.commits.len(), 1);
        let record = &walk.commits[0];
        assert_eq!(record.message, "Initial commit");
        assert_eq!(record.author, "Test User");
        assert_eq!(record.changes.len(), 3);
        assert!(record.changes.iter().all(|c| c.lines_deleted == 0));

        let lines = |p: &str| {
            record
                .changes
                .iter()
                .find(|c| c.file_path.as_str() == p)
                .map(|c| c.lines_added)
        };
        assert_eq!(lines("a.txt"), Some(3));
        assert_eq!(lines("src/b.rs"), Some(1));
        assert_eq!(lines("empty"), Some(0));
    }

    #[test]
    fn test_modified_and_deleted_files() {
        let repo = TestRepo::new();
        repo.commit(
            &[("grow.txt", Some("a\n")), ("gone.txt", Some("x\ny\n"))],
            "first",
        );
        repo.commit(
            &[("grow.txt", Some("a\nb\nc\n")), ("gone.txt", None)],
            "second",
        );

        let walk = repo.history().walk(None, &CancelToken::never()).unwrap();
        assert_eq!(walk.commits.len(), 2);
        // Newest first
        let newest = &walk.commits[0];
        assert_eq!(newest.message, "second");

        let grow = newest
            .changes
            .iter()
            .find(|c| c.file_path.as_str() == "grow.txt")
            .unwrap();
        assert_eq!((grow.lines_added, grow.lines_deleted), (2, 0));
        let gone = newest
            .changes
            .iter()
            .find(|c| c.file_path.as_str() == "gone.txt")
            .unwrap();
        assert_eq!((gone.lines_added, gone.lines_deleted), (0, 2));
    }

    #[test]
    fn test_since_excludes_checkpoint_and_ancestors() {
        let repo = TestRepo::new();
        let c1 = repo.commit(&[("f", Some("1\n"))], "c1");
        let c2 = repo.commit(&[("f", Some("1\n2\n"))], "c2");
        let c3 = repo.commit(&[("f", Some("1\n2\n3\n"))], "c3");

        let history = repo.history();
        let walk = history.walk(Some(&hash(c1)), &CancelToken::never()).unwrap();
        let hashes: Vec<_> = walk.commits.iter().map(|c| c.hash.clone()).collect();
        assert_eq!(hashes, vec![c3.to_string(), c2.to_string()]);

        let walk = history.walk(Some(&hash(c3)), &CancelToken::never()).unwrap();
        assert!(walk.commits.is_empty());
    }

    #[test]
    fn test_unknown_checkpoint_fails() {
        let repo = TestRepo::new();
        repo.commit(&[("f", Some("1\n"))], "c1");
        let bogus = GitHash::parse("0123456789abcdef0123456789abcdef01234567").unwrap();
        assert!(matches!(
            repo.history().walk(Some(&bogus), &CancelToken::never()),
            Err(HistoryError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn test_cancelled_walk_stops_early() {
        let repo = TestRepo::new();
        repo.commit(&[("f", Some("1\n"))], "c1");
        repo.commit(&[("f", Some("2\n"))], "c2");
        let token = CancelToken::new();
        token.cancel();
        let walk = repo.history().walk(None, &token).unwrap();
        assert!(walk.cancelled);
        assert!(walk.commits.is_empty());
    }

    #[test]
    fn test_source_clones_file_url() {
        let upstream = TestRepo::new();
        upstream.commit(&[("README.md", Some("hello\n"))], "init");

        let scratch = tempdir().unwrap();
        let source = GitHistorySource::new(scratch.path());
        let url = format!("file://{}", upstream.dir.path().display());
        let location = RepoLocation::parse(&url).unwrap();
        assert!(location.is_remote());

        let walk = source
            .list_commits(&location, None, &CancelToken::never())
            .unwrap();
        assert_eq!(walk.commits.len(), 1);

        // A second run reuses and refreshes the mirror
        upstream.commit(&[("README.md", Some("hello\nworld\n"))], "more");
        let walk = source
            .list_commits(&location, None, &CancelToken::never())
            .unwrap();
        assert_eq!(walk.commits.len(), 2);
    }
}
