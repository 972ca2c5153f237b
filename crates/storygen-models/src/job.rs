//! Job model and lifecycle transitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{JobError, JobInput};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue
    #[default]
    Pending,
    /// A worker holds the job
    Processing,
    /// Job finished successfully
    Completed,
    /// Job failed terminally
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One end-to-end generation request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Lifecycle state
    #[serde(default)]
    pub status: JobStatus,

    /// Caller-supplied generation parameters
    pub input: JobInput,

    /// Final artifact locator, set once on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    /// Structured error, set once on terminal failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Overall progress (0-100), the mean across the pipeline's stages
    #[serde(default)]
    pub progress: u8,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When a worker first claimed the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(id: JobId, input: JobInput) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            input,
            output_url: None,
            error: None,
            progress: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Start processing the job.
    pub fn start(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark the job as completed.
    pub fn complete(mut self, output_url: Option<String>) -> Self {
        self.status = JobStatus::Completed;
        self.output_url = output_url;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark the job as terminally failed.
    pub fn fail(mut self, error: JobError) -> Self {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Return the job to the queueable state (graceful-shutdown requeue).
    pub fn requeue(mut self) -> Self {
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.updated_at = Utc::now();
        self
    }

    /// Update overall progress.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Product;

    fn test_job() -> Job {
        Job::new(JobId::new(), JobInput::new(Product::TemplateVideo))
    }

    #[test]
    fn test_job_creation() {
        let job = test_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_job_state_transitions() {
        let started = test_job().start();
        assert_eq!(started.status, JobStatus::Processing);
        assert!(started.started_at.is_some());

        let completed = started.complete(Some("https://cdn.example/final.mp4".into()));
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.progress, 100);
        assert!(completed.completed_at.is_some());
        assert!(completed.status.is_terminal());
    }

    #[test]
    fn test_job_failure_records_error() {
        let failed = test_job().start().fail(JobError::invalid_input("bad brief"));
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_ref().unwrap().message, "bad brief");
        assert!(failed.status.is_terminal());
    }

    #[test]
    fn test_job_requeue_resets_claim() {
        let requeued = test_job().start().requeue();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert!(requeued.started_at.is_none());
    }
}
