//! In-memory registry of conversion runs started through the API.
//!
//! At most one run is in flight at a time. The most recent
//! [`MAX_FINISHED_JOBS`] finished runs stay queryable; older ones are evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use conversion_core::{
    CancellationToken, PartialFailure, ProgressSnapshot, ProgressState, RunOutcome, RunReport,
};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;

/// Finished runs kept for `GET /conversions/{id}`
pub const MAX_FINISHED_JOBS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success(_) => JobStatus::Succeeded,
            RunOutcome::Cancelled => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }
}

#[derive(Debug)]
struct Job {
    status: JobStatus,
    progress: ProgressSnapshot,
    cancel: CancellationToken,
    report: Option<RunReport>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// What `GET /conversions/{id}` returns.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub progress: ProgressSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub dropped: Vec<PartialFailure>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Registry {
    jobs: HashMap<String, Job>,
    active: Option<String>,
    /// Finished ids, oldest first.
    finished: VecDeque<String>,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    inner: Mutex<Registry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new run, refusing if another one is still in flight.
    pub fn begin(&self) -> Result<(String, CancellationToken), ApiError> {
        let mut registry = self.lock();
        if let Some(active) = &registry.active {
            return Err(ApiError::Conflict(format!(
                "Conversion {} is already running",
                active
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        registry.jobs.insert(
            id.clone(),
            Job {
                status: JobStatus::Running,
                progress: ProgressSnapshot::default(),
                cancel: cancel.clone(),
                report: None,
                created_at: Utc::now(),
                finished_at: None,
            },
        );
        registry.active = Some(id.clone());
        Ok((id, cancel))
    }

    pub fn record_progress(&self, id: &str, progress: ProgressState) {
        if let Some(job) = self.lock().jobs.get_mut(id) {
            job.progress = progress.into();
        }
    }

    pub fn finish(&self, id: &str, report: RunReport) {
        let mut registry = self.lock();
        if registry.active.as_deref() == Some(id) {
            registry.active = None;
        }
        let Some(job) = registry.jobs.get_mut(id) else {
            return;
        };
        let first_finish = job.report.is_none();
        job.status = JobStatus::from_outcome(&report.outcome);
        job.finished_at = Some(Utc::now());
        job.report = Some(report);
        info!(id, status = ?job.status, "Conversion recorded");

        if first_finish {
            registry.finished.push_back(id.to_string());
        }
        while registry.finished.len() > MAX_FINISHED_JOBS {
            if let Some(evicted) = registry.finished.pop_front() {
                registry.jobs.remove(&evicted);
            }
        }
    }

    /// Request cancellation. Only the wait on the engine reacts to it.
    pub fn cancel(&self, id: &str) -> Result<JobView, ApiError> {
        let registry = self.lock();
        let job = registry
            .jobs
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("Conversion not found: {}", id)))?;
        if job.status == JobStatus::Running {
            info!(id, "Cancelling conversion");
            job.cancel.cancel();
        }
        Ok(view(id, job))
    }

    pub fn get(&self, id: &str) -> Option<JobView> {
        self.lock().jobs.get(id).map(|job| view(id, job))
    }

    pub fn active(&self) -> Option<String> {
        self.lock().active.clone()
    }
}

fn view(id: &str, job: &Job) -> JobView {
    let outcome = job.report.as_ref().map(|r| r.outcome.clone());
    JobView {
        id: id.to_string(),
        status: job.status,
        progress: job.progress,
        code: outcome.as_ref().and_then(RunOutcome::error_code),
        outcome,
        dropped: job
            .report
            .as_ref()
            .map(|r| r.dropped.clone())
            .unwrap_or_default(),
        created_at: job.created_at,
        finished_at: job.finished_at,
    }
}
