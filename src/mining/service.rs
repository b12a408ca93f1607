//! Background ingestion and the query facade
//!
//! `IngestService` admits jobs through the registry on the caller's thread,
//! so a conflicting request fails immediately, then runs the miner on a
//! dedicated worker thread.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::{IngestOutcome, IngestState, MineError, RepositoryMiner};
use crate::analytics::{CouplingQuery, HotspotAnalyzer, OwnershipAnalyzer, TemporalCouplingAnalyzer};
use crate::git::{HistorySource, RepoLocation};
use crate::jobs::{AnalysisJobRegistry, JobTicket};
use crate::models::{
    AuthorContribution, FileChangeFrequency, FileOwnership, LastRun, Project, ProjectStatus,
    RunResult, TemporalCoupling,
};
use crate::store::{ChangeStore, ProjectStore};

/// A running ingestion.
#[derive(Debug)]
pub struct IngestHandle {
    project: String,
    handle: JoinHandle<Result<IngestOutcome, MineError>>,
}

impl IngestHandle {
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its outcome
    pub fn join(self) -> Result<IngestOutcome, MineError> {
        self.handle
            .join()
            .map_err(|_| MineError::WorkerPanicked(self.project))?
    }
}

/// Last worker outcome per project, kept so a dropped handle does not lose it
#[derive(Debug, Default)]
struct RunLog {
    runs: Mutex<HashMap<String, LastRun>>,
}

impl RunLog {
    /// Acquire the log lock. Panics if poisoned (a thread panicked mid-update).
    fn table(&self) -> MutexGuard<'_, HashMap<String, LastRun>> {
        self.runs
            .lock()
            .expect("run log lock poisoned: a thread panicked while holding this lock")
    }

    fn record(&self, project: &str, result: &Result<IngestOutcome, MineError>) {
        let run = match result {
            Ok(outcome) => LastRun {
                result: match outcome.state {
                    IngestState::Completed => RunResult::Completed,
                    IngestState::CancelledEarly => RunResult::Cancelled,
                },
                error: None,
                finished_at: Utc::now(),
            },
            Err(e) => LastRun {
                result: RunResult::Failed,
                error: Some(e.to_string()),
                finished_at: Utc::now(),
            },
        };
        self.table().insert(project.to_string(), run);
    }

    fn get(&self, project: &str) -> Option<LastRun> {
        self.table().get(project).cloned()
    }
}

/// Entry point for ingestion and every read-side query.
#[derive(Clone)]
pub struct IngestService {
    projects: Arc<dyn ProjectStore>,
    changes: Arc<dyn ChangeStore>,
    registry: Arc<AnalysisJobRegistry>,
    runs: Arc<RunLog>,
    miner: RepositoryMiner,
}

impl IngestService {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        changes: Arc<dyn ChangeStore>,
        history: Arc<dyn HistorySource>,
    ) -> Self {
        Self::with_registry(projects, changes, history, Arc::new(AnalysisJobRegistry::new()))
    }

    /// Share a registry with other services over the same stores
    pub fn with_registry(
        projects: Arc<dyn ProjectStore>,
        changes: Arc<dyn ChangeStore>,
        history: Arc<dyn HistorySource>,
        registry: Arc<AnalysisJobRegistry>,
    ) -> Self {
        let miner = RepositoryMiner::new(projects.clone(), changes.clone(), history);
        Self {
            projects,
            changes,
            registry,
            runs: Arc::new(RunLog::default()),
            miner,
        }
    }

    pub fn registry(&self) -> &Arc<AnalysisJobRegistry> {
        &self.registry
    }

    /// Start a full ingestion of `location` into project `name`.
    pub fn start_full(&self, name: &str, location: &str) -> Result<IngestHandle, MineError> {
        let location = parse_location(location)?;
        let ticket = self.registry.begin(name)?;
        let miner = self.miner.clone();
        self.spawn(ticket, move |ticket| {
            miner.ingest_full(ticket.project(), &location, ticket)
        })
    }

    /// Start an incremental ingestion from the project's checkpoint.
    ///
    /// Projects that were never analyzed get a full ingestion instead.
    pub fn start_incremental(&self, name: &str, location: &str) -> Result<IngestHandle, MineError> {
        let location = parse_location(location)?;
        let ticket = self.registry.begin(name)?;
        let checkpoint = self
            .projects
            .get_by_name(name)?
            .and_then(|p| p.last_analyzed_hash);
        let miner = self.miner.clone();

        match checkpoint {
            Some(since) => self.spawn(ticket, move |ticket| {
                miner.ingest_incremental(ticket.project(), &location, &since, ticket)
            }),
            None => {
                info!("Project {} has no checkpoint, running full ingestion", name);
                self.spawn(ticket, move |ticket| {
                    miner.ingest_full(ticket.project(), &location, ticket)
                })
            }
        }
    }

    /// Run `work` on a named worker thread.
    ///
    /// The outcome is logged and recorded before the ticket is released, so
    /// once the slot is free `status` already reports how the run ended.
    fn spawn<F>(&self, ticket: JobTicket, work: F) -> Result<IngestHandle, MineError>
    where
        F: FnOnce(&JobTicket) -> Result<IngestOutcome, MineError> + Send + 'static,
    {
        let project = ticket.project().to_string();
        let runs = Arc::clone(&self.runs);
        let handle = thread::Builder::new()
            .name(format!("ingest-{}", project))
            .spawn(move || {
                let result = work(&ticket);
                match &result {
                    Ok(outcome) if outcome.is_cancelled() => {
                        warn!("Ingestion of {} was cancelled", ticket.project())
                    }
                    Ok(_) => {}
                    Err(e) => error!("Ingestion of {} failed: {}", ticket.project(), e),
                }
                runs.record(ticket.project(), &result);
                ticket.end();
                result
            })
            .map_err(MineError::Spawn)?;
        debug!("Spawned ingestion worker for {}", project);
        Ok(IngestHandle { project, handle })
    }

    pub fn request_cancel(&self, name: &str) -> Result<(), MineError> {
        Ok(self.registry.request_cancel(name)?)
    }

    pub fn status(&self, name: &str) -> Result<ProjectStatus, MineError> {
        let project = self.project(name)?;
        Ok(ProjectStatus {
            is_analyzed: project.is_analyzed(),
            last_commit_hash: project.last_analyzed_hash.clone(),
            change_count: self.changes.count_changes(project.id)?,
            file_count: self.changes.count_files(project.id)?,
            job_running: self.registry.is_running(&project.name),
            last_run: self.runs.get(&project.name),
            project: project.name,
        })
    }

    pub fn projects(&self) -> Result<Vec<Project>, MineError> {
        Ok(self.projects.list()?)
    }

    pub fn hotspots(&self, name: &str, limit: usize) -> Result<Vec<FileChangeFrequency>, MineError> {
        let project = self.project(name)?;
        Ok(HotspotAnalyzer::new(self.changes.clone()).rank(project.id, limit)?)
    }

    pub fn coupling(&self, name: &str, query: &CouplingQuery) -> Result<Vec<TemporalCoupling>, MineError> {
        let project = self.project(name)?;
        Ok(TemporalCouplingAnalyzer::new(self.changes.clone()).couple(project.id, query)?)
    }

    pub fn author_breakdown(&self, name: &str, limit: usize) -> Result<Vec<AuthorContribution>, MineError> {
        let project = self.project(name)?;
        Ok(OwnershipAnalyzer::new(self.changes.clone()).author_breakdown(project.id, limit)?)
    }

    pub fn file_ownership(&self, name: &str, limit: usize) -> Result<Vec<FileOwnership>, MineError> {
        let project = self.project(name)?;
        Ok(OwnershipAnalyzer::new(self.changes.clone()).file_ownership(project.id, limit)?)
    }

    fn project(&self, name: &str) -> Result<Project, MineError> {
        self.projects
            .get_by_name(name)?
            .ok_or_else(|| MineError::ProjectNotFound(name.to_string()))
    }
}

fn parse_location(raw: &str) -> Result<RepoLocation, MineError> {
    RepoLocation::parse(raw).map_err(|e| MineError::InvalidLocation(e.to_string()))
}
