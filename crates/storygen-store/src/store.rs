//! The persistence contract the worker consumes, plus the status view
//! assembled for callers polling a job.

use async_trait::async_trait;
use serde::Serialize;

use storygen_models::{Job, JobError, JobId, JobStatus, PipelinePlan, StageRecord};

use crate::error::StoreResult;

/// Repository for job and stage rows.
///
/// Terminal transitions (`complete_job`, `fail_job`) are conditional: they
/// return `false` when the job already reached a terminal state, so repeated
/// exhaustion signals cannot produce duplicate terminal writes.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create the job row if it does not exist. Idempotent on job id.
    async fn create_job(&self, job: &Job) -> StoreResult<()>;

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Claim transition: `processing`, stamping `started_at` on first claim.
    async fn mark_job_processing(&self, id: &JobId) -> StoreResult<()>;

    /// Requeue transition: back to `pending` with the claim cleared.
    async fn mark_job_pending(&self, id: &JobId) -> StoreResult<()>;

    /// Update overall progress without touching status.
    async fn set_job_progress(&self, id: &JobId, progress: u8) -> StoreResult<()>;

    /// Terminal success. Returns `false` if the job was already terminal.
    async fn complete_job(&self, id: &JobId, output_url: Option<&str>) -> StoreResult<bool>;

    /// Terminal failure. Returns `false` if the job was already terminal.
    async fn fail_job(&self, id: &JobId, error: &JobError) -> StoreResult<bool>;

    /// Insert or update a stage row, keyed by (job_id, name).
    /// `completed_at` is only ever written once.
    async fn upsert_stage(&self, stage: &StageRecord) -> StoreResult<()>;

    async fn get_stage(&self, job_id: &JobId, name: &str) -> StoreResult<Option<StageRecord>>;

    /// All stages for a job, ordered by plan index.
    async fn list_stages(&self, job_id: &JobId) -> StoreResult<Vec<StageRecord>>;

    /// Store connectivity probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// The status-query response: current status, overall progress, per-stage
/// breakdown, and the output reference or error.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub output_url: Option<String>,
    pub error: Option<JobError>,
    pub stages: Vec<StageRecord>,
}

/// Assemble the status view for a job, recomputing overall progress as the
/// mean of stage progress over the job's plan.
pub async fn status_view(
    store: &dyn JobStore,
    job_id: &JobId,
) -> StoreResult<Option<JobStatusView>> {
    let Some(job) = store.get_job(job_id).await? else {
        return Ok(None);
    };

    let stages = store.list_stages(job_id).await?;

    // Derive the plan to know how many stages the mean runs over; stages
    // not yet created count as 0. Fall back to the persisted progress if
    // the input no longer derives a plan.
    let progress = match PipelinePlan::for_input(&job.input) {
        Ok(plan) => {
            let mut per_stage = vec![0u8; plan.len()];
            for stage in &stages {
                if let Some(slot) = per_stage.get_mut(stage.index as usize) {
                    *slot = stage.progress;
                }
            }
            plan.overall_progress(&per_stage)
        }
        Err(_) => job.progress,
    };

    Ok(Some(JobStatusView {
        job_id: job.id,
        status: job.status,
        progress,
        output_url: job.output_url,
        error: job.error,
        stages,
    }))
}
