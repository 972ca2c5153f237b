//! Stage records: one ordered pipeline step owned by exactly one job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{JobError, JobId, StageDescriptor, StageKind};

/// Stage lifecycle state, mirroring the job states but stage-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted record of one pipeline stage.
///
/// Identity is (job_id, name). Retries re-enter `Processing` and overwrite
/// only transient fields; `completed_at` is written exactly once, on
/// success or on the final failure.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageRecord {
    pub job_id: JobId,
    pub name: String,
    pub kind: StageKind,
    /// Position in the job's plan
    pub index: u32,
    #[serde(default)]
    pub status: StageStatus,
    /// Progress within this stage (0-100), non-decreasing per attempt
    #[serde(default)]
    pub progress: u8,
    /// Attempts started so far (1 after the first `begin_attempt`)
    #[serde(default)]
    pub attempt: u32,
    /// Opaque intermediate artifacts consumed by later stages
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Populated on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StageRecord {
    /// Create a pending stage for a plan entry.
    pub fn new(job_id: JobId, descriptor: &StageDescriptor, index: u32) -> Self {
        Self {
            job_id,
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            index,
            status: StageStatus::Pending,
            progress: 0,
            attempt: 0,
            data: Map::new(),
            error: None,
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Begin a (re-)attempt: transient fields reset, attempt counter bumped.
    pub fn begin_attempt(mut self) -> Self {
        self.status = StageStatus::Processing;
        self.progress = 0;
        self.error = None;
        self.attempt += 1;
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        self
    }

    /// Mark the stage completed with its output data. Sets `completed_at`
    /// only if it is not already set.
    pub fn complete(mut self, data: Map<String, Value>) -> Self {
        self.status = StageStatus::Completed;
        self.progress = 100;
        self.data = data;
        self.error = None;
        let now = Utc::now();
        self.completed_at.get_or_insert(now);
        self.updated_at = now;
        self
    }

    /// Record a failed attempt that will be retried. Leaves the terminal
    /// timestamp untouched.
    pub fn fail_transient(mut self, error: JobError) -> Self {
        self.status = StageStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
        self
    }

    /// Record the final failure. Sets `completed_at` once.
    pub fn fail_terminal(mut self, error: JobError) -> Self {
        self.status = StageStatus::Failed;
        self.error = Some(error);
        let now = Utc::now();
        self.completed_at.get_or_insert(now);
        self.updated_at = now;
        self
    }

    /// Update in-stage progress, clamped and non-decreasing.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stage() -> StageRecord {
        StageRecord::new(
            JobId::new(),
            &StageDescriptor::single(StageKind::Voice),
            1,
        )
    }

    #[test]
    fn test_attempt_resets_transient_fields() {
        let stage = test_stage()
            .begin_attempt()
            .with_progress(40)
            .fail_transient(JobError::new(crate::ErrorKind::Timeout, "deadline"));
        assert_eq!(stage.attempt, 1);
        assert!(stage.completed_at.is_none());

        let retried = stage.begin_attempt();
        assert_eq!(retried.attempt, 2);
        assert_eq!(retried.status, StageStatus::Processing);
        assert_eq!(retried.progress, 0);
        assert!(retried.error.is_none());
    }

    #[test]
    fn test_completed_at_set_once() {
        let stage = test_stage().begin_attempt().complete(Map::new());
        let first = stage.completed_at;
        assert!(first.is_some());

        // A spurious second completion must not move the terminal timestamp.
        let again = stage.complete(Map::new());
        assert_eq!(again.completed_at, first);
    }

    #[test]
    fn test_progress_non_decreasing() {
        let stage = test_stage().begin_attempt().with_progress(60).with_progress(30);
        assert_eq!(stage.progress, 60);
    }

    #[test]
    fn test_terminal_failure_sets_completed_at() {
        let stage = test_stage()
            .begin_attempt()
            .fail_terminal(JobError::new(crate::ErrorKind::Rejected, "policy"));
        assert_eq!(stage.status, StageStatus::Failed);
        assert!(stage.completed_at.is_some());
        assert!(!stage.error.as_ref().unwrap().is_retryable());
    }
}
