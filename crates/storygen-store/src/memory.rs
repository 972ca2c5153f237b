//! In-memory implementation of the job store.
//!
//! Backs the worker's scenario tests and local development. Semantics match
//! the Postgres implementation, including the conditional terminal writes
//! and the set-once `completed_at` on stages.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use storygen_models::{Job, JobError, JobId, JobStatus, StageRecord};

use crate::error::StoreResult;
use crate::store::JobStore;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    // keyed by (job_id, stage name)
    stages: HashMap<(String, String), StageRecord>,
}

/// In-memory job store.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .jobs
            .entry(job.id.as_str().to_string())
            .or_insert_with(|| job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.jobs.get(id.as_str()).cloned())
    }

    async fn mark_job_processing(&self, id: &JobId) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(job) = inner.jobs.get_mut(id.as_str()) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Processing;
                job.started_at.get_or_insert_with(Utc::now);
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_job_pending(&self, id: &JobId) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(job) = inner.jobs.get_mut(id.as_str()) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Pending;
                job.started_at = None;
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn set_job_progress(&self, id: &JobId, progress: u8) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(job) = inner.jobs.get_mut(id.as_str()) {
            job.progress = progress.min(100);
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_job(&self, id: &JobId, output_url: Option<&str>) -> StoreResult<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.jobs.get_mut(id.as_str()) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Completed;
                job.output_url = output_url.map(str::to_string);
                job.progress = 100;
                job.completed_at = Some(Utc::now());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_job(&self, id: &JobId, error: &JobError) -> StoreResult<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.jobs.get_mut(id.as_str()) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Failed;
                job.error = Some(error.clone());
                job.completed_at = Some(Utc::now());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_stage(&self, stage: &StageRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        let key = (stage.job_id.as_str().to_string(), stage.name.clone());
        match inner.stages.get_mut(&key) {
            Some(existing) => {
                let kept_completed_at = existing.completed_at;
                *existing = stage.clone();
                // completed_at is set exactly once.
                if kept_completed_at.is_some() {
                    existing.completed_at = kept_completed_at;
                }
            }
            None => {
                inner.stages.insert(key, stage.clone());
            }
        }
        Ok(())
    }

    async fn get_stage(&self, job_id: &JobId, name: &str) -> StoreResult<Option<StageRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .stages
            .get(&(job_id.as_str().to_string(), name.to_string()))
            .cloned())
    }

    async fn list_stages(&self, job_id: &JobId) -> StoreResult<Vec<StageRecord>> {
        let inner = self.inner.read().unwrap();
        let mut stages: Vec<_> = inner
            .stages
            .values()
            .filter(|s| s.job_id == *job_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.index);
        Ok(stages)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::status_view;
    use serde_json::Map;
    use storygen_models::{ErrorKind, JobInput, PipelinePlan, Product, StageDescriptor, StageKind};

    fn seed_job() -> Job {
        Job::new(JobId::new(), JobInput::new(Product::TemplateVideo))
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = MemoryJobStore::new();
        let job = seed_job();
        store.create_job(&job).await.unwrap();

        let modified = job.clone().start();
        store.create_job(&modified).await.unwrap();

        let stored = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_terminal_transition_fires_once() {
        let store = MemoryJobStore::new();
        let job = seed_job();
        store.create_job(&job).await.unwrap();
        store.mark_job_processing(&job.id).await.unwrap();

        assert!(store.complete_job(&job.id, Some("u")).await.unwrap());
        assert!(!store.complete_job(&job.id, Some("v")).await.unwrap());
        assert!(!store
            .fail_job(&job.id, &JobError::new(ErrorKind::Internal, "late"))
            .await
            .unwrap());

        let stored = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.output_url.as_deref(), Some("u"));
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn test_stage_completed_at_is_kept_on_upsert() {
        let store = MemoryJobStore::new();
        let job_id = JobId::new();
        let descriptor = StageDescriptor::single(StageKind::Script);

        let stage = StageRecord::new(job_id.clone(), &descriptor, 0)
            .begin_attempt()
            .complete(Map::new());
        store.upsert_stage(&stage).await.unwrap();
        let first = store
            .get_stage(&job_id, "script")
            .await
            .unwrap()
            .unwrap()
            .completed_at;

        // A later write must not move the terminal timestamp.
        let rewritten = stage.complete(Map::new());
        store.upsert_stage(&rewritten).await.unwrap();
        let second = store
            .get_stage(&job_id, "script")
            .await
            .unwrap()
            .unwrap()
            .completed_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_stages_ordered_by_index() {
        let store = MemoryJobStore::new();
        let job_id = JobId::new();
        for (i, kind) in [StageKind::Voice, StageKind::Script].iter().enumerate() {
            let descriptor = StageDescriptor::single(*kind);
            // Insert out of order: voice gets index 1, script index 0.
            let index = 1 - i as u32;
            store
                .upsert_stage(&StageRecord::new(job_id.clone(), &descriptor, index))
                .await
                .unwrap();
        }

        let stages = store.list_stages(&job_id).await.unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["script", "voice"]);
    }

    #[tokio::test]
    async fn test_status_view_mean_progress() {
        let store = MemoryJobStore::new();
        let job = seed_job();
        store.create_job(&job).await.unwrap();

        let plan = PipelinePlan::for_input(&job.input).unwrap();
        // First stage complete, second halfway.
        let s0 = StageRecord::new(job.id.clone(), &plan.stages()[0], 0)
            .begin_attempt()
            .complete(Map::new());
        let s1 = StageRecord::new(job.id.clone(), &plan.stages()[1], 1)
            .begin_attempt()
            .with_progress(50);
        store.upsert_stage(&s0).await.unwrap();
        store.upsert_stage(&s1).await.unwrap();

        let view = status_view(&store, &job.id).await.unwrap().unwrap();
        assert_eq!(view.progress, 37); // (100 + 50 + 0 + 0) / 4
        assert_eq!(view.stages.len(), 2);
    }
}
