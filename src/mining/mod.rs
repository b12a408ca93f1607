//! Repository mining
//!
//! Walks a repository's history and persists each commit with its per-file
//! changes, advancing the project's checkpoint as it goes.
//!
//! An ingestion moves through `Admitted -> Walking -> Persisting ->
//! Checkpointed -> Released`. Cancellation is checked at commit boundaries
//! and ends the run early, never in the middle of a commit.

pub mod service;

pub use service::{IngestHandle, IngestService};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::git::{CommitRecord, HistoryError, HistorySource, RepoLocation};
use crate::jobs::{JobError, JobTicket};
use crate::models::{FilePath, GitHash, NewChange, NewCommit, NewProject, Project};
use crate::store::{ChangeStore, ProjectStore, StoreError};

/// Errors that abort an ingestion or a query
#[derive(Error, Debug)]
pub enum MineError {
    #[error("Invalid repository location: {0}")]
    InvalidLocation(String),

    #[error("Project {0:?} not found")]
    ProjectNotFound(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to start ingestion worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Ingestion worker for {0:?} panicked")]
    WorkerPanicked(String),
}

impl MineError {
    /// Whether retrying the same request could succeed.
    ///
    /// Bad input (unknown project, unreadable location, missing checkpoint)
    /// and admission conflicts are not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            MineError::History(e) => !e.is_bad_input(),
            MineError::Store(e) => e.is_transient(),
            MineError::Spawn(_) => true,
            MineError::InvalidLocation(_)
            | MineError::ProjectNotFound(_)
            | MineError::Job(_)
            | MineError::WorkerPanicked(_) => false,
        }
    }
}

/// How an ingestion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Completed,
    CancelledEarly,
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Commits persisted by this run
    pub commit_count: u64,
    /// Changes persisted by this run
    pub change_count: u64,
    /// Distinct files across the whole project after this run
    pub file_count: u64,
    /// Commits or paths that could not be ingested
    pub error_count: u64,
    /// Commits already present from an earlier run
    pub skipped_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub project: String,
    pub stats: IngestStats,
    pub state: IngestState,
    /// Checkpoint after the run
    pub last_commit_hash: Option<GitHash>,
}

impl IngestOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.state == IngestState::CancelledEarly
    }
}

/// Persists repository history into the stores.
#[derive(Clone)]
pub struct RepositoryMiner {
    projects: Arc<dyn ProjectStore>,
    changes: Arc<dyn ChangeStore>,
    history: Arc<dyn HistorySource>,
}

impl RepositoryMiner {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        changes: Arc<dyn ChangeStore>,
        history: Arc<dyn HistorySource>,
    ) -> Self {
        Self {
            projects,
            changes,
            history,
        }
    }

    /// Ingest everything reachable from HEAD, creating the project if needed.
    pub fn ingest_full(
        &self,
        project_name: &str,
        location: &RepoLocation,
        ticket: &JobTicket,
    ) -> Result<IngestOutcome, MineError> {
        let project = self.resolve_project(project_name, location)?;
        info!("Starting full ingestion of {} from {}", project.name, location);
        self.run(project, location, None, ticket)
    }

    /// Ingest only commits after `since`. The project must already exist.
    pub fn ingest_incremental(
        &self,
        project_name: &str,
        location: &RepoLocation,
        since: &GitHash,
        ticket: &JobTicket,
    ) -> Result<IngestOutcome, MineError> {
        let project = self
            .projects
            .get_by_name(project_name)?
            .ok_or_else(|| MineError::ProjectNotFound(project_name.to_string()))?;
        info!(
            "Starting incremental ingestion of {} from {} since {}",
            project.name,
            location,
            since.short()
        );
        self.run(project, location, Some(since), ticket)
    }

    /// Look up the project by name, creating it on first sight.
    fn resolve_project(&self, name: &str, location: &RepoLocation) -> Result<Project, MineError> {
        if let Some(project) = self.projects.get_by_name(name)? {
            return Ok(project);
        }
        let created = self.projects.create(NewProject {
            name: name.to_string(),
            repo_path: location.display_url(),
        });
        match created {
            Ok(project) => {
                info!("Created project {} (id {})", project.name, project.id);
                Ok(project)
            }
            // Lost a creation race; the other writer's record wins
            Err(StoreError::DuplicateProject(_)) => self
                .projects
                .get_by_name(name)?
                .ok_or_else(|| MineError::ProjectNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn run(
        &self,
        mut project: Project,
        location: &RepoLocation,
        since: Option<&GitHash>,
        ticket: &JobTicket,
    ) -> Result<IngestOutcome, MineError> {
        let mut stats = IngestStats::default();

        let walk = self.history.list_commits(location, since, ticket.token())?;
        if walk.cancelled || ticket.is_cancelled() {
            info!("Ingestion of {} cancelled while walking history", project.name);
            stats.file_count = self.changes.count_files(project.id)?;
            return Ok(IngestOutcome {
                project: project.name,
                stats,
                state: IngestState::CancelledEarly,
                last_commit_hash: project.last_analyzed_hash,
            });
        }

        stats.error_count += walk.invalid_paths as u64;
        info!("Walked {} commits for {}", walk.commits.len(), project.name);

        let mut state = IngestState::Completed;
        let mut checkpoint: Option<GitHash> = None;

        // Oldest first, so the checkpoint only ever moves past persisted work
        for record in walk.commits.iter().rev() {
            if ticket.is_cancelled() {
                info!(
                    "Ingestion of {} cancelled after {} commits",
                    project.name, stats.commit_count
                );
                state = IngestState::CancelledEarly;
                break;
            }

            match self.persist_commit(&project, record) {
                Ok(Persisted::Written { hash, changes }) => {
                    debug!("Persisted {} ({} changes)", hash.short(), changes);
                    stats.commit_count += 1;
                    stats.change_count += changes;
                    checkpoint = Some(hash);
                }
                Ok(Persisted::AlreadyPresent(hash)) => {
                    debug!("Skipping {}: already ingested", hash.short());
                    stats.skipped_count += 1;
                    checkpoint = Some(hash);
                }
                Err(e) => {
                    warn!("Skipping commit {:?}: {}", record.hash, e);
                    stats.error_count += 1;
                }
            }
        }

        if let Some(hash) = checkpoint {
            project.last_analyzed_hash = Some(hash);
            self.projects.update(&project)?;
        }

        stats.file_count = self.changes.count_files(project.id)?;
        info!(
            "Finished ingestion of {}: {} commits, {} changes, {} files, {} skipped, {} errors",
            project.name,
            stats.commit_count,
            stats.change_count,
            stats.file_count,
            stats.skipped_count,
            stats.error_count
        );

        Ok(IngestOutcome {
            project: project.name,
            stats,
            state,
            last_commit_hash: project.last_analyzed_hash,
        })
    }

    /// Validate one record and write it with its changes in one transaction.
    fn persist_commit(&self, project: &Project, record: &CommitRecord) -> Result<Persisted, CommitError> {
        let hash = GitHash::parse(&record.hash).map_err(|e| CommitError::Invalid(e.to_string()))?;
        if self.changes.has_commit(project.id, &hash)? {
            return Ok(Persisted::AlreadyPresent(hash));
        }

        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| CommitError::Invalid(format!("timestamp {:?}: {}", record.timestamp, e)))?;

        let changes: Vec<NewChange> = record
            .changes
            .iter()
            .filter_map(|delta| {
                // Records from the git backend are already normalized; re-check
                // anything that came through another source.
                match FilePath::new(delta.file_path.as_str()) {
                    Ok(file_path) => Some(NewChange {
                        file_path,
                        lines_added: delta.lines_added,
                        lines_deleted: delta.lines_deleted,
                    }),
                    Err(e) => {
                        warn!("Dropping change in {}: {}", hash.short(), e);
                        None
                    }
                }
            })
            .collect();

        let (_, written) = self.changes.record_commit(
            NewCommit {
                project_id: project.id,
                hash: hash.clone(),
                author: record.author.clone(),
                timestamp,
                message: record.message.clone(),
            },
            &changes,
        )?;

        Ok(Persisted::Written {
            hash,
            changes: written.len() as u64,
        })
    }
}

enum Persisted {
    Written { hash: GitHash, changes: u64 },
    AlreadyPresent(GitHash),
}

/// Failure confined to a single commit; counted, never fatal
#[derive(Error, Debug)]
enum CommitError {
    #[error("invalid record: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory history fixtures shared by the miner and service tests

    use super::*;
    use crate::git::{FileDelta, Walk};
    use crate::jobs::CancelToken;
    use std::sync::Mutex;

    pub fn hash(n: u64) -> String {
        format!("{:040x}", n)
    }

    pub fn record(n: u64, files: &[&str]) -> CommitRecord {
        CommitRecord {
            hash: hash(n),
            author: if n % 2 == 0 { "ana" } else { "bo" }.to_string(),
            timestamp: format!("2024-01-{:02}T12:00:00+00:00", n.min(28)),
            message: format!("commit {n}"),
            changes: files
                .iter()
                .map(|f| FileDelta {
                    file_path: FilePath::new(f).unwrap(),
                    lines_added: 3,
                    lines_deleted: 1,
                })
                .collect(),
        }
    }

    /// History held in memory, newest first
    #[derive(Default)]
    pub struct ScriptedHistory {
        commits: Mutex<Vec<CommitRecord>>,
    }

    impl ScriptedHistory {
        pub fn new(oldest_first: Vec<CommitRecord>) -> Self {
            let mut commits = oldest_first;
            commits.reverse();
            Self {
                commits: Mutex::new(commits),
            }
        }

        /// Add a commit on top of HEAD
        pub fn push(&self, record: CommitRecord) {
            self.commits.lock().unwrap().insert(0, record);
        }
    }

    impl HistorySource for ScriptedHistory {
        fn list_commits(
            &self,
            _location: &RepoLocation,
            since: Option<&GitHash>,
            cancel: &CancelToken,
        ) -> Result<Walk, HistoryError> {
            let all = self.commits.lock().unwrap().clone();
            let end = match since {
                None => all.len(),
                Some(since) => all
                    .iter()
                    .position(|c| c.hash == since.as_str())
                    .ok_or_else(|| HistoryError::CheckpointNotFound(since.clone()))?,
            };
            Ok(Walk {
                commits: all[..end].to_vec(),
                cancelled: cancel.is_cancelled(),
                invalid_paths: 0,
            })
        }
    }
}
