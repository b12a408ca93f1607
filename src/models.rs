//! Core data models for churnwatch
//!
//! Persisted records (projects, commits, changes), the validated identifiers
//! they are keyed by, and the derived metric rows the analyzers produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for identifier value types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid commit hash {0:?}: expected 40 hex characters")]
    InvalidHash(String),

    #[error("Invalid file path {0:?}")]
    InvalidPath(String),
}

/// Full 40-character commit hash.
///
/// Accepts either case on input; stored lowercase so two spellings of the
/// same object id compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GitHash(String);

impl GitHash {
    pub const LEN: usize = 40;

    pub fn parse(s: &str) -> Result<Self, ModelError> {
        if s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(ModelError::InvalidHash(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display (12 characters)
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl FromStr for GitHash {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GitHash {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GitHash> for String {
    fn from(hash: GitHash) -> Self {
        hash.0
    }
}

impl fmt::Display for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Repository-relative file path in canonical `/`-separated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilePath(String);

impl FilePath {
    /// Normalize and validate a path.
    ///
    /// Backslashes become `/`, `.` segments and empty segments are dropped.
    /// Empty results and paths containing NUL are rejected.
    pub fn new(raw: &str) -> Result<Self, ModelError> {
        if raw.contains('\0') {
            return Err(ModelError::InvalidPath(raw.replace('\0', "\\0")));
        }

        let unified = raw.replace('\\', "/");
        let normalized = unified
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");

        if normalized.is_empty() {
            return Err(ModelError::InvalidPath(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased extension of the final segment, if any.
    ///
    /// Dotfiles such as `.gitignore` have no extension.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) if idx + 1 < name.len() => Some(name[idx + 1..].to_ascii_lowercase()),
            Some(_) => None,
        }
    }
}

impl FromStr for FilePath {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FilePath {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<FilePath> for String {
    fn from(path: FilePath) -> Self {
        path.0
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type ProjectId = u64;
pub type CommitId = u64;

/// A tracked repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Local path or remote URL (credentials stripped)
    pub repo_path: String,
    /// Checkpoint: newest commit ingested so far
    #[serde(default)]
    pub last_analyzed_hash: Option<GitHash>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn is_analyzed(&self) -> bool {
        self.last_analyzed_hash.is_some()
    }
}

/// A project that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub repo_path: String,
}

/// A persisted commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub project_id: ProjectId,
    pub hash: GitHash,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommit {
    pub project_id: ProjectId,
    pub hash: GitHash,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// One file touched by one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: u64,
    pub commit_id: CommitId,
    pub file_path: FilePath,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub file_path: FilePath,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// Per-file change frequency (derived, never stored)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeFrequency {
    pub file_path: FilePath,
    /// Distinct commits touching the file
    pub change_count: u64,
    pub total_added: u64,
    pub total_deleted: u64,
}

impl FileChangeFrequency {
    pub fn total_lines(&self) -> u64 {
        self.total_added + self.total_deleted
    }
}

/// Co-change relationship between two files (derived, never stored)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalCoupling {
    /// Lexicographically smaller path of the pair
    pub file_a: FilePath,
    pub file_b: FilePath,
    pub shared_commits: u64,
    pub total_commits_a: u64,
    pub total_commits_b: u64,
    pub coupling_score: f64,
    /// Timestamp of the newest commit containing both files
    pub last_modified: DateTime<Utc>,
}

/// Per-author totals across a project's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorContribution {
    pub author: String,
    pub commit_count: u64,
    pub files_touched: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// How concentrated authorship of a single file is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOwnership {
    pub file_path: FilePath,
    pub author_count: u64,
    pub top_author: String,
    /// Fraction of the file's commits made by `top_author`
    pub top_author_share: f64,
    pub change_count: u64,
}

/// How the most recent ingestion worker for a project ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub result: RunResult,
    /// Error message when `result` is `Failed`
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Status snapshot for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub project: String,
    pub is_analyzed: bool,
    pub last_commit_hash: Option<GitHash>,
    pub change_count: u64,
    pub file_count: u64,
    pub job_running: bool,
    /// Outcome of the last worker this process ran for the project
    #[serde(default)]
    pub last_run: Option<LastRun>,
}
