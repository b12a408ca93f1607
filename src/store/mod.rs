//! Persistence interfaces for projects, commits and changes
//!
//! The miner and the analyzers only see these traits. Two implementations
//! ship with the crate:
//!
//! - [`MemoryStore`]: in-process, for tests and one-shot runs
//! - [`RedbStore`]: embedded ACID store on disk (redb)

pub mod memory;
pub mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::analytics::hotspots;
use crate::models::{
    Change, Commit, CommitId, FileChangeFrequency, GitHash, NewChange, NewCommit, NewProject,
    Project, ProjectId,
};

/// Errors that can occur in a store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] redb::Error),

    #[error("Failed to encode or decode a record: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Commit {hash} already exists for project {project_id}")]
    DuplicateCommit { project_id: ProjectId, hash: GitHash },

    #[error("A project named {0:?} already exists")]
    DuplicateProject(String),

    #[error("Project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("Commit {0} not found")]
    CommitNotFound(CommitId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Backend and IO failures may succeed on retry; the rest are logic errors
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_) | StoreError::Io(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Project lookup and checkpoint updates
pub trait ProjectStore: Send + Sync {
    fn get_by_name(&self, name: &str) -> StoreResult<Option<Project>>;

    fn get_by_id(&self, id: ProjectId) -> StoreResult<Option<Project>>;

    /// Fails with [`StoreError::DuplicateProject`] if the name is taken
    fn create(&self, project: NewProject) -> StoreResult<Project>;

    /// Overwrite an existing project record
    fn update(&self, project: &Project) -> StoreResult<()>;

    /// All projects ordered by id
    fn list(&self) -> StoreResult<Vec<Project>>;
}

/// Commit and change persistence plus the aggregate reads analyzers build on
pub trait ChangeStore: Send + Sync {
    /// Persist a commit. Fails with [`StoreError::DuplicateCommit`] if the
    /// project already has this hash.
    fn create_commit(&self, commit: NewCommit) -> StoreResult<Commit>;

    /// Persist changes for an existing commit, all or nothing
    fn create_changes_batch(
        &self,
        commit_id: CommitId,
        changes: &[NewChange],
    ) -> StoreResult<Vec<Change>>;

    /// Persist a commit together with its changes in one transaction.
    ///
    /// Either the commit and every change become visible, or nothing does.
    fn record_commit(
        &self,
        commit: NewCommit,
        changes: &[NewChange],
    ) -> StoreResult<(Commit, Vec<Change>)>;

    fn has_commit(&self, project_id: ProjectId, hash: &GitHash) -> StoreResult<bool>;

    /// Commits of a project ordered by id (persistence order)
    fn commits_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Commit>>;

    /// Changes of a project ordered by id
    fn changes_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Change>>;

    fn count_changes(&self, project_id: ProjectId) -> StoreResult<u64> {
        Ok(self.changes_for_project(project_id)?.len() as u64)
    }

    /// Distinct normalized file paths across all of a project's changes
    fn count_files(&self, project_id: ProjectId) -> StoreResult<u64> {
        let changes = self.changes_for_project(project_id)?;
        let files: FxHashSet<&str> = changes.iter().map(|c| c.file_path.as_str()).collect();
        Ok(files.len() as u64)
    }

    /// Per-file change frequencies, most-changed first. `limit == 0` means all.
    fn change_frequencies(
        &self,
        project_id: ProjectId,
        limit: usize,
    ) -> StoreResult<Vec<FileChangeFrequency>> {
        let changes = self.changes_for_project(project_id)?;
        let mut frequencies = hotspots::aggregate(&changes);
        hotspots::sort_and_truncate(&mut frequencies, limit);
        Ok(frequencies)
    }
}
