//! Ingestion job admission and cooperative cancellation
//!
//! At most one ingestion per project is admitted at a time. Cancellation is a
//! request, not a kill: the running miner polls its [`CancelToken`] between
//! commits and stops cleanly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("An ingestion job is already running for project {0:?}")]
    AlreadyRunning(String),

    #[error("No ingestion job is running for project {0:?}")]
    NotRunning(String),
}

/// Shared cancellation flag for one admitted job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that can never be cancelled
    pub fn never() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Whether both tokens belong to the same admission
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

/// Tracks which projects have an admitted ingestion job.
///
/// The table is keyed by project name. The lock guards only map access and
/// is never held while a job is doing work.
#[derive(Debug, Default)]
pub struct AnalysisJobRegistry {
    jobs: Mutex<HashMap<String, CancelToken>>,
}

impl AnalysisJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the table lock. Panics if poisoned (a thread panicked mid-update).
    fn table(&self) -> MutexGuard<'_, HashMap<String, CancelToken>> {
        self.jobs
            .lock()
            .expect("job registry lock poisoned: a thread panicked while holding this lock")
    }

    /// Admit a job for `project`.
    ///
    /// Each admission gets a fresh token, so a cancellation aimed at an
    /// earlier run is never observed by this one.
    pub fn begin(self: &Arc<Self>, project: &str) -> Result<JobTicket, JobError> {
        let token = {
            let mut jobs = self.table();
            if jobs.contains_key(project) {
                return Err(JobError::AlreadyRunning(project.to_string()));
            }
            let token = CancelToken::new();
            jobs.insert(project.to_string(), token.clone());
            token
        };
        debug!("Admitted ingestion job for {}", project);

        Ok(JobTicket {
            registry: Arc::clone(self),
            project: project.to_string(),
            token,
            released: false,
        })
    }

    /// Release the slot for `project`. Releasing an idle project is a no-op.
    pub fn end(&self, project: &str) {
        if self.table().remove(project).is_some() {
            debug!("Released ingestion job for {}", project);
        }
    }

    /// Release the slot only if it still belongs to the admission that
    /// issued `token`. A slot re-admitted after a forced [`end`](Self::end)
    /// is left alone.
    fn release(&self, project: &str, token: &CancelToken) {
        let mut jobs = self.table();
        match jobs.get(project) {
            Some(current) if current.same_as(token) => {
                jobs.remove(project);
                debug!("Released ingestion job for {}", project);
            }
            Some(_) => debug!("Slot for {} was re-admitted, not releasing", project),
            None => {}
        }
    }

    pub fn request_cancel(&self, project: &str) -> Result<(), JobError> {
        match self.table().get(project) {
            Some(token) => {
                token.cancel();
                debug!("Cancellation requested for {}", project);
                Ok(())
            }
            None => Err(JobError::NotRunning(project.to_string())),
        }
    }

    /// Whether the admitted job for `project` has been asked to stop.
    /// Idle projects report `false`.
    pub fn is_cancelled(&self, project: &str) -> bool {
        self.table()
            .get(project)
            .is_some_and(CancelToken::is_cancelled)
    }

    pub fn is_running(&self, project: &str) -> bool {
        self.table().contains_key(project)
    }
}

/// Proof of admission. Releases the project's slot when dropped.
#[derive(Debug)]
pub struct JobTicket {
    registry: Arc<AnalysisJobRegistry>,
    project: String,
    token: CancelToken,
    released: bool,
}

impl JobTicket {
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Release explicitly (same as dropping the ticket)
    pub fn end(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.project, &self.token);
        }
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        self.release();
    }
}
