//! Events published to the broker's status and progress topics.
//!
//! Delivery is fire-and-forget, at-most-once. Listeners that miss events
//! recover by polling the persisted job/stage rows or the status snapshot.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus, StageStatus};

/// Emitted on the global status topic whenever a job changes status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Worker attribution for operational debugging
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(job_id: JobId, status: JobStatus, worker_id: impl Into<String>) -> Self {
        Self {
            job_id,
            status,
            worker_id: worker_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Emitted on the per-job granular topic on every stage-status transition.
///
/// `progress` is the job's overall progress (the mean across stages), not
/// the stage's own percentage, so a listener can render a single smooth bar.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub stage: String,
    pub progress: u8,
    pub status: StageStatus,
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        job_id: JobId,
        stage: impl Into<String>,
        progress: u8,
        status: StageStatus,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            stage: stage.into(),
            progress: progress.min(100),
            status,
            worker_id: worker_id.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serialization() {
        let event = ProgressEvent::new(
            JobId::from_string("job-1"),
            "voice",
            37,
            StageStatus::Processing,
            "worker-a",
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"job_id\":\"job-1\""));
        assert!(json.contains("\"stage\":\"voice\""));
        assert!(json.contains("\"progress\":37"));
        assert!(json.contains("\"processing\""));
    }

    #[test]
    fn test_progress_event_clamps() {
        let event = ProgressEvent::new(
            JobId::from_string("job-1"),
            "stitch",
            150,
            StageStatus::Completed,
            "worker-a",
        );
        assert_eq!(event.progress, 100);
    }

    #[test]
    fn test_status_event_serialization() {
        let event = StatusEvent::new(JobId::from_string("job-2"), JobStatus::Failed, "worker-b");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"failed\""));
        assert!(json.contains("\"worker-b\""));
    }
}
