//! Job lifecycle and the job-persistence collaborator. A [`Job`] represents
//! one execution attempt of a pipeline:
//! `pending -> running -> {completed | failed | retrying}`, with
//! `retrying -> running` after a backoff delay. Job metadata is persisted at
//! creation and at every status transition; in-flight records are not.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Retrying => write!(f, "retrying"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub pipeline_id: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub records_processed: u64,
    pub records_failed: u64,
    /// Pipeline watermark at job start.
    pub watermark: DateTime<Utc>,
    pub retry_count: u16,
    /// Last terminal cause, set when the job fails.
    pub error: Option<String>,
}

impl Job {
    pub fn new(pipeline_id: impl Into<String>, watermark: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pipeline_id: pipeline_id.into(),
            status: JobStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            records_processed: 0,
            records_failed: 0,
            watermark,
            retry_count: 0,
            error: None,
        }
    }
}

/// Durability collaborator for job metadata. Only job history outlives the
/// process; the processing queue stays in volatile memory.
#[trait_variant::make(JobStore: Send)]
pub trait LocalJobStore {
    async fn save_job(&self, job: &Job) -> Result<()>;
    async fn get_job(&self, id: &str) -> Result<Option<Job>>;
    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<()>;
}

/// In-memory [`JobStore`]; the default when no durable store is wired in,
/// and the store used by tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

impl JobStore for InMemoryJobStore {
    async fn save_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.read().get(id).cloned())
    }

    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<()> {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(id) {
            job.status = status;
            if status.is_terminal() {
                job.end_time = Some(Utc::now());
            }
            if error.is_some() {
                job.error = error;
            }
        }
        Ok(())
    }
}
