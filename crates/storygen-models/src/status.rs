//! Cached job status snapshot for fast polling queries.
//!
//! Stored in the broker's key/value cache with a TTL so pollers can read
//! current status without touching the persistent store. Disconnected
//! progress listeners fall back to this (or the store) for recovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobError, JobStatus};

/// Snapshot of a job's externally visible state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    /// Unique job identifier
    pub job_id: String,
    /// Current job status
    pub status: JobStatus,
    /// Overall progress (0-100)
    pub progress: u8,
    /// Name of the stage currently processing, if any
    pub current_stage: Option<String>,
    /// Error record if the job failed
    pub error: Option<JobError>,
    /// Worker that produced this snapshot
    pub worker_id: Option<String>,
    /// When the snapshot was last written
    pub updated_at: DateTime<Utc>,
}

impl JobStatusSnapshot {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            progress: 0,
            current_stage: None,
            error: None,
            worker_id: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record that `worker_id` is processing `stage` at `progress` overall.
    pub fn set_processing(
        &mut self,
        stage: impl Into<String>,
        progress: u8,
        worker_id: impl Into<String>,
    ) {
        self.status = JobStatus::Processing;
        self.current_stage = Some(stage.into());
        self.progress = progress.min(100);
        self.worker_id = Some(worker_id.into());
        self.updated_at = Utc::now();
    }

    /// Mark the job completed.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_stage = None;
        self.updated_at = Utc::now();
    }

    /// Mark the job failed with its error record.
    pub fn fail(&mut self, error: JobError) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }

    /// Mark the job requeued (graceful shutdown handed it back).
    pub fn requeue(&mut self) {
        self.status = JobStatus::Pending;
        self.current_stage = None;
        self.worker_id = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_snapshot_transitions() {
        let mut snap = JobStatusSnapshot::new("job-1");
        assert_eq!(snap.status, JobStatus::Pending);
        assert!(!snap.is_terminal());

        snap.set_processing("voice", 37, "worker-a");
        assert_eq!(snap.status, JobStatus::Processing);
        assert_eq!(snap.current_stage.as_deref(), Some("voice"));
        assert_eq!(snap.progress, 37);

        snap.complete();
        assert_eq!(snap.progress, 100);
        assert!(snap.is_terminal());
        assert!(snap.current_stage.is_none());
    }

    #[test]
    fn test_snapshot_failure_keeps_error() {
        let mut snap = JobStatusSnapshot::new("job-2");
        snap.set_processing("script", 0, "worker-a");
        snap.fail(JobError::new(ErrorKind::Rejected, "content policy"));
        assert!(snap.is_terminal());
        assert_eq!(snap.error.as_ref().unwrap().kind, ErrorKind::Rejected);
    }

    #[test]
    fn test_snapshot_requeue_clears_worker() {
        let mut snap = JobStatusSnapshot::new("job-3");
        snap.set_processing("clip-0", 12, "worker-a");
        snap.requeue();
        assert_eq!(snap.status, JobStatus::Pending);
        assert!(snap.worker_id.is_none());
    }
}
