//! Progress events via Redis Pub/Sub, plus the TTL status snapshot cache.
//!
//! Delivery is at-most-once: nothing is replayed for late subscribers, and
//! a publish failure must never fail job processing. Callers log-and-swallow
//! (`.ok()`) on the publish paths.

use futures_util::StreamExt;
use redis::AsyncCommands;
use tracing::debug;

use storygen_models::{JobId, JobStatusSnapshot, ProgressEvent, StatusEvent};

use crate::error::QueueResult;

/// Global topic carrying job status transitions.
pub const STATUS_CHANNEL: &str = "storygen:events:status";

/// How long a status snapshot survives in the cache without updates.
pub const SNAPSHOT_TTL_SECS: u64 = 3600;

/// Channel for publishing/subscribing to progress events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&redis_url)
    }

    /// Granular topic name for a job.
    pub fn progress_channel_name(job_id: &JobId) -> String {
        format!("storygen:progress:{}", job_id)
    }

    /// Snapshot cache key for a job.
    fn snapshot_key(job_id: &str) -> String {
        format!("storygen:status:{}", job_id)
    }

    /// Publish a job status transition on the global status topic.
    pub async fn publish_status(&self, event: &StatusEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(event)?;

        debug!("Publishing status event for job {}", event.job_id);
        conn.publish::<_, _, ()>(STATUS_CHANNEL, payload).await?;

        Ok(())
    }

    /// Publish a granular progress event on the job's topic.
    pub async fn publish_progress(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::progress_channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Write the job's status snapshot with a TTL.
    pub async fn put_snapshot(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(snapshot)?;
        conn.set_ex::<_, _, ()>(Self::snapshot_key(&snapshot.job_id), payload, SNAPSHOT_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Read a job's status snapshot, if one is cached.
    pub async fn get_snapshot(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(Self::snapshot_key(job_id.as_str())).await?;

        match payload {
            Some(p) => Ok(serde_json::from_str(&p).ok()),
            None => Ok(None),
        }
    }

    /// Subscribe to a job's granular progress events.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe_progress(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>>
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::progress_channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
