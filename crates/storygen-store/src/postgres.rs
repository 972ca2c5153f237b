//! Postgres implementation of the job store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use storygen_models::{
    ErrorKind, Job, JobError, JobId, JobStatus, StageKind, StageRecord, StageStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

/// Postgres-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with production pool limits.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Connect using `DATABASE_URL`.
    pub async fn from_env() -> StoreResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::invalid_record("DATABASE_URL is not set"))?;
        Self::connect(&url).await
    }

    /// Run embedded migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        info!("Store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn job_status_from_str(s: &str) -> JobStatus {
    match s {
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn stage_status_from_str(s: &str) -> StageStatus {
    match s {
        "processing" => StageStatus::Processing,
        "completed" => StageStatus::Completed,
        "failed" => StageStatus::Failed,
        _ => StageStatus::Pending,
    }
}

fn stage_kind_from_str(s: &str) -> StoreResult<StageKind> {
    match s {
        "script" => Ok(StageKind::Script),
        "voice" => Ok(StageKind::Voice),
        "video" => Ok(StageKind::Video),
        "composite" => Ok(StageKind::Composite),
        "scene_plan" => Ok(StageKind::ScenePlan),
        "clip" => Ok(StageKind::Clip),
        "lip_sync" => Ok(StageKind::LipSync),
        "stitch" => Ok(StageKind::Stitch),
        other => Err(StoreError::invalid_record(format!(
            "unknown stage kind: {other}"
        ))),
    }
}

fn error_kind_from_str(s: &str) -> ErrorKind {
    match s {
        "timeout" => ErrorKind::Timeout,
        "network" => ErrorKind::Network,
        "rate_limited" => ErrorKind::RateLimited,
        "upstream_unavailable" => ErrorKind::UpstreamUnavailable,
        "broker_unavailable" => ErrorKind::BrokerUnavailable,
        "store_unavailable" => ErrorKind::StoreUnavailable,
        "invalid_input" => ErrorKind::InvalidInput,
        "unsupported_format" => ErrorKind::UnsupportedFormat,
        "payload_too_large" => ErrorKind::PayloadTooLarge,
        "rejected" => ErrorKind::Rejected,
        _ => ErrorKind::Internal,
    }
}

fn error_from_columns(
    kind: Option<String>,
    message: Option<String>,
) -> Option<JobError> {
    kind.map(|k| JobError::new(error_kind_from_str(&k), message.unwrap_or_default()))
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Job> {
    let status_str: String = row.try_get("status")?;
    let input_value: serde_json::Value = row.try_get("input")?;
    let progress: i16 = row.try_get("progress")?;

    Ok(Job {
        id: JobId::from_string(row.try_get::<String, _>("id")?),
        status: job_status_from_str(&status_str),
        input: serde_json::from_value(input_value)?,
        output_url: row.try_get("output_url")?,
        error: error_from_columns(row.try_get("error_kind")?, row.try_get("error_message")?),
        progress: progress.clamp(0, 100) as u8,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn stage_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<StageRecord> {
    let status_str: String = row.try_get("status")?;
    let kind_str: String = row.try_get("kind")?;
    let data_value: serde_json::Value = row.try_get("data")?;
    let progress: i16 = row.try_get("progress")?;
    let attempt: i32 = row.try_get("attempt")?;
    let index: i32 = row.try_get("stage_index")?;

    let data = match data_value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    Ok(StageRecord {
        job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        name: row.try_get("name")?,
        kind: stage_kind_from_str(&kind_str)?,
        index: index.max(0) as u32,
        status: stage_status_from_str(&status_str),
        progress: progress.clamp(0, 100) as u8,
        attempt: attempt.max(0) as u32,
        data,
        error: error_from_columns(row.try_get("error_kind")?, row.try_get("error_message")?),
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, status, input, output_url, error_kind, error_message,
                              progress, created_at, updated_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.status.as_str())
        .bind(serde_json::to_value(&job.input)?)
        .bind(&job.output_url)
        .bind(job.error.as_ref().map(|e| e.kind.as_str()))
        .bind(job.error.as_ref().map(|e| e.message.as_str()))
        .bind(i16::from(job.progress))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, input, output_url, error_kind, error_message,
                   progress, created_at, updated_at, started_at, completed_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn mark_job_processing(&self, id: &JobId) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing',
                started_at = COALESCE(started_at, now()),
                updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_job_pending(&self, id: &JobId) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', started_at = NULL, updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_job_progress(&self, id: &JobId, progress: u8) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET progress = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(i16::from(progress.min(100)))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_job(&self, id: &JobId, output_url: Option<&str>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', output_url = $2, progress = 100,
                completed_at = now(), updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id.as_str())
        .bind(output_url)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_job(&self, id: &JobId, error: &JobError) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error_kind = $2, error_message = $3,
                completed_at = now(), updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id.as_str())
        .bind(error.kind.as_str())
        .bind(&error.message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_stage(&self, stage: &StageRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stages (job_id, name, kind, stage_index, status, progress, attempt,
                                data, error_kind, error_message, started_at, completed_at,
                                updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (job_id, name) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                attempt = EXCLUDED.attempt,
                data = EXCLUDED.data,
                error_kind = EXCLUDED.error_kind,
                error_message = EXCLUDED.error_message,
                started_at = COALESCE(stages.started_at, EXCLUDED.started_at),
                completed_at = COALESCE(stages.completed_at, EXCLUDED.completed_at),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(stage.job_id.as_str())
        .bind(&stage.name)
        .bind(stage.kind.as_str())
        .bind(stage.index as i32)
        .bind(stage.status.as_str())
        .bind(i16::from(stage.progress))
        .bind(stage.attempt as i32)
        .bind(serde_json::Value::Object(stage.data.clone()))
        .bind(stage.error.as_ref().map(|e| e.kind.as_str()))
        .bind(stage.error.as_ref().map(|e| e.message.as_str()))
        .bind(stage.started_at)
        .bind(stage.completed_at)
        .bind(stage.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_stage(&self, job_id: &JobId, name: &str) -> StoreResult<Option<StageRecord>> {
        let row = sqlx::query(
            r#"
            SELECT job_id, name, kind, stage_index, status, progress, attempt, data,
                   error_kind, error_message, started_at, completed_at, updated_at
            FROM stages
            WHERE job_id = $1 AND name = $2
            "#,
        )
        .bind(job_id.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| stage_from_row(&r)).transpose()
    }

    async fn list_stages(&self, job_id: &JobId) -> StoreResult<Vec<StageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, name, kind, stage_index, status, progress, attempt, data,
                   error_kind, error_message, started_at, completed_at, updated_at
            FROM stages
            WHERE job_id = $1
            ORDER BY stage_index
            "#,
        )
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stage_from_row).collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
