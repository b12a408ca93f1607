//! Git history access
//!
//! Turns a repository location into a stream of commit records carrying
//! per-file line deltas.
//!
//! # Example
//!
//! ```no_run
//! use churnwatch::git::{GitHistorySource, HistorySource, RepoLocation};
//! use churnwatch::jobs::CancelToken;
//!
//! let source = GitHistorySource::new("/tmp/churnwatch-clones");
//! let location = RepoLocation::parse("/path/to/repo").unwrap();
//! let walk = source.list_commits(&location, None, &CancelToken::never()).unwrap();
//! for commit in &walk.commits {
//!     println!("{} {} files", commit.hash, commit.changes.len());
//! }
//! ```

pub mod history;
pub mod lines;
pub mod remote;

pub use history::{GitHistory, GitHistorySource};
pub use remote::{Credentials, RepoLocation};

use crate::jobs::CancelToken;
use crate::models::{FilePath, GitHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reading repository history. All of these abort an ingestion.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Invalid repository location: {0:?}")]
    InvalidLocation(String),

    #[error("Failed to open git repository at {location}: {source}")]
    RepoOpen {
        location: String,
        #[source]
        source: git2::Error,
    },

    #[error("Failed to clone or fetch {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("Checkpoint commit {0} is not in the repository history (rewritten upstream?)")]
    CheckpointNotFound(GitHash),

    #[error("History walk failed: {0}")]
    HistoryWalk(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// Failures caused by the request itself rather than the environment
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            HistoryError::InvalidLocation(_)
                | HistoryError::RepoOpen { .. }
                | HistoryError::CheckpointNotFound(_)
        )
    }
}

/// Line delta for one file in one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelta {
    pub file_path: FilePath,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// One commit as read from history, before validation and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Raw object id as reported by the history backend
    pub hash: String,
    pub author: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub message: String,
    pub changes: Vec<FileDelta>,
}

/// Result of walking history.
#[derive(Debug, Clone, Default)]
pub struct Walk {
    /// Newest first
    pub commits: Vec<CommitRecord>,
    /// The walk stopped early because its token was cancelled
    pub cancelled: bool,
    /// Per-file paths dropped because they failed validation
    pub invalid_paths: usize,
}

/// Source of commit history.
pub trait HistorySource: Send + Sync {
    /// List commits reachable from HEAD, newest first.
    ///
    /// With `since`, the walk excludes that commit and its ancestors. The
    /// token is polled between commits; a cancelled walk returns what it had
    /// with `cancelled` set.
    fn list_commits(
        &self,
        location: &RepoLocation,
        since: Option<&GitHash>,
        cancel: &CancelToken,
    ) -> Result<Walk, HistoryError>;
}
