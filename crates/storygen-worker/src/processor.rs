//! The per-job stage state machine.
//!
//! Drives one job through its ordered stage sequence, synchronously within
//! the worker: mark processing, invoke the executor, persist the outcome,
//! publish progress, and apply the retry policy on failure. A fatal or
//! exhausted stage fails the job exactly once and stops the pipeline.

use std::sync::Arc;

use metrics::counter;
use serde_json::{Map, Value};
use tracing::{info, warn};

use storygen_models::{
    Job, JobError, JobId, JobInput, JobStatus, JobStatusSnapshot, PipelinePlan, ProgressEvent,
    StageDescriptor, StageRecord, StageStatus, StatusEvent,
};
use storygen_queue::{ProgressSink, QueueJob};
use storygen_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::retry::RetryDecision;
use crate::stage::{ExecutorRegistry, StageContext, StageFailure};

/// Dependencies for job processing, injected so tests can run on fakes.
pub struct ProcessorContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn JobStore>,
    pub progress: Arc<dyn ProgressSink>,
    pub executors: ExecutorRegistry,
}

/// Terminal outcome of one processed job. Either way the delivery is
/// settled; the distinction is for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

/// Process one dequeued job to a terminal state.
///
/// Returns an error only for infrastructure failures (store unreachable);
/// in that case the delivery is left unsettled for later reclaim. Executor
/// failures never propagate: they are classified and persisted here.
pub async fn run_job(ctx: &ProcessorContext, queued: &QueueJob) -> WorkerResult<JobOutcome> {
    let job_id = &queued.job_id;
    let logger = JobLogger::new(job_id, "pipeline");

    // Load or create the job row. Re-delivery of an already-terminal job
    // (e.g. after an ack was lost) is a no-op.
    let job = match ctx.store.get_job(job_id).await? {
        Some(existing) if existing.status.is_terminal() => {
            warn!(job_id = %job_id, status = %existing.status, "Job already terminal, skipping");
            return Ok(match existing.status {
                JobStatus::Completed => JobOutcome::Completed,
                _ => JobOutcome::Failed,
            });
        }
        Some(existing) => existing,
        None => {
            let job = Job::new(job_id.clone(), queued.input.clone());
            ctx.store.create_job(&job).await?;
            job
        }
    };

    ctx.store.mark_job_processing(job_id).await?;
    emit_status(ctx, job_id, JobStatus::Processing).await;
    logger.log_start("claimed from queue");

    let mut snapshot = JobStatusSnapshot::new(job_id.as_str());

    // Derive the stage sequence. An underivable plan is the caller's fault:
    // fail immediately, creating no stages.
    let plan = match PipelinePlan::for_input(&job.input) {
        Ok(plan) => plan,
        Err(error) => {
            logger.log_error(&format!("plan derivation failed: {}", error));
            fail_job(ctx, job_id, &mut snapshot, error).await?;
            return Ok(JobOutcome::Failed);
        }
    };

    let mut per_stage = vec![0u8; plan.len()];
    let mut acc_data: Map<String, Value> = Map::new();

    for (index, descriptor) in plan.stages().iter().enumerate() {
        // A requeued or reclaimed job resumes: completed stages keep their
        // one-and-only completion and just contribute their data.
        let existing = ctx.store.get_stage(job_id, &descriptor.name).await?;
        if let Some(done) = existing
            .as_ref()
            .filter(|s| s.status == StageStatus::Completed)
        {
            acc_data.extend(done.data.clone());
            per_stage[index] = 100;
            continue;
        }

        let stage = existing
            .unwrap_or_else(|| StageRecord::new(job_id.clone(), descriptor, index as u32));

        match run_stage(
            ctx,
            &plan,
            descriptor,
            stage,
            &job.input,
            &mut per_stage,
            &mut snapshot,
            &acc_data,
        )
        .await?
        {
            StageResult::Completed(data) => {
                acc_data.extend(data);
            }
            StageResult::Failed(error) => {
                logger.log_error(&format!("stage {} failed: {}", descriptor.name, error));
                fail_job(ctx, job_id, &mut snapshot, error).await?;
                return Ok(JobOutcome::Failed);
            }
        }
    }

    // All stages done. The terminal stage conventionally reports the final
    // artifact; its absence is tolerated since stage data is opaque.
    let output_url = acc_data
        .get("output_url")
        .and_then(Value::as_str)
        .map(str::to_string);
    if output_url.is_none() {
        warn!(job_id = %job_id, "Pipeline finished without an output_url in stage data");
    }

    if ctx
        .store
        .complete_job(job_id, output_url.as_deref())
        .await?
    {
        counter!("storygen_jobs_completed_total").increment(1);
        emit_status(ctx, job_id, JobStatus::Completed).await;
        snapshot.complete();
        put_snapshot(ctx, &snapshot).await;
    }

    logger.log_completion("all stages completed");
    Ok(JobOutcome::Completed)
}

enum StageResult {
    Completed(Map<String, Value>),
    Failed(JobError),
}

/// Run one stage to its terminal state, retrying per policy.
#[allow(clippy::too_many_arguments)]
async fn run_stage(
    ctx: &ProcessorContext,
    plan: &PipelinePlan,
    descriptor: &StageDescriptor,
    mut stage: StageRecord,
    input: &JobInput,
    per_stage: &mut [u8],
    snapshot: &mut JobStatusSnapshot,
    acc_data: &Map<String, Value>,
) -> WorkerResult<StageResult> {
    let job_id = stage.job_id.clone();
    let index = stage.index as usize;
    let policy = ctx.config.retry_policy();

    let Some(executor) = ctx.executors.get(descriptor.kind) else {
        // A plan stage nothing can execute is a wiring/input problem, not
        // something a retry can fix.
        let error = JobError::invalid_input(format!(
            "no executor registered for stage kind {}",
            descriptor.kind
        ));
        stage = stage.fail_terminal(error.clone());
        ctx.store.upsert_stage(&stage).await?;
        emit_stage_progress(ctx, plan, per_stage, &stage).await;
        return Ok(StageResult::Failed(error));
    };

    loop {
        stage = stage.begin_attempt();
        ctx.store.upsert_stage(&stage).await?;
        per_stage[index] = 0;

        let overall = plan.overall_progress(per_stage);
        emit_stage_progress(ctx, plan, per_stage, &stage).await;
        snapshot.set_processing(stage.name.as_str(), overall, ctx.config.worker_id.as_str());
        put_snapshot(ctx, snapshot).await;
        ctx.store.set_job_progress(&job_id, overall).await?;

        info!(
            job_id = %job_id,
            stage = %stage.name,
            attempt = stage.attempt,
            "Invoking stage executor"
        );

        let result = executor
            .execute(StageContext {
                job_id: &job_id,
                stage: &stage.name,
                input,
                stage_data: acc_data,
            })
            .await;

        match result {
            Ok(output) => {
                stage = stage.complete(output.clone());
                ctx.store.upsert_stage(&stage).await?;
                per_stage[index] = 100;

                let overall = plan.overall_progress(per_stage);
                emit_stage_progress(ctx, plan, per_stage, &stage).await;
                ctx.store.set_job_progress(&job_id, overall).await?;

                return Ok(StageResult::Completed(output));
            }
            Err(failure) => match policy.decide(&failure, stage.attempt) {
                RetryDecision::Retry { delay } => {
                    counter!("storygen_stage_retries_total", "stage" => descriptor.kind.as_str())
                        .increment(1);
                    warn!(
                        job_id = %job_id,
                        stage = %stage.name,
                        attempt = stage.attempt,
                        "Stage attempt failed, retrying in {:?}: {}", delay, failure
                    );
                    stage = stage.fail_transient(failure.to_job_error());
                    ctx.store.upsert_stage(&stage).await?;
                    emit_stage_progress(ctx, plan, per_stage, &stage).await;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Fail => {
                    let error = terminal_error(&stage, &failure);
                    stage = stage.fail_terminal(error.clone());
                    ctx.store.upsert_stage(&stage).await?;
                    emit_stage_progress(ctx, plan, per_stage, &stage).await;
                    return Ok(StageResult::Failed(error));
                }
            },
        }
    }
}

/// The persisted error for a terminally failed stage. Exhausted retries are
/// distinguishable from first-attempt fatal failures by message.
fn terminal_error(stage: &StageRecord, failure: &StageFailure) -> JobError {
    if failure.retryable {
        JobError::new(
            failure.kind,
            format!(
                "{} failed after {} attempts: {}",
                stage.name, stage.attempt, failure.message
            ),
        )
    } else {
        failure.to_job_error()
    }
}

/// Fail the job exactly once. The store's conditional terminal write is the
/// duplicate-suppression point; events only fire when the write landed.
async fn fail_job(
    ctx: &ProcessorContext,
    job_id: &JobId,
    snapshot: &mut JobStatusSnapshot,
    error: JobError,
) -> WorkerResult<()> {
    if ctx.store.fail_job(job_id, &error).await? {
        counter!("storygen_jobs_failed_total", "kind" => error.kind.as_str()).increment(1);
        emit_status(ctx, job_id, JobStatus::Failed).await;
        snapshot.fail(error);
        put_snapshot(ctx, snapshot).await;
    }
    Ok(())
}

/// Publish a granular progress event. Progress reporting is a convenience:
/// failures are logged and swallowed, never failing the job.
async fn emit_stage_progress(
    ctx: &ProcessorContext,
    plan: &PipelinePlan,
    per_stage: &[u8],
    stage: &StageRecord,
) {
    let event = ProgressEvent::new(
        stage.job_id.clone(),
        stage.name.clone(),
        plan.overall_progress(per_stage),
        stage.status,
        ctx.config.worker_id.as_str(),
    );
    if let Err(e) = ctx.progress.publish_progress(&event).await {
        warn!("Failed to publish progress event: {}", e);
    }
}

async fn emit_status(ctx: &ProcessorContext, job_id: &JobId, status: JobStatus) {
    let event = StatusEvent::new(job_id.clone(), status, ctx.config.worker_id.as_str());
    if let Err(e) = ctx.progress.publish_status(&event).await {
        warn!("Failed to publish status event: {}", e);
    }
}

async fn put_snapshot(ctx: &ProcessorContext, snapshot: &JobStatusSnapshot) {
    if let Err(e) = ctx.progress.put_snapshot(snapshot).await {
        warn!("Failed to write status snapshot: {}", e);
    }
}
