//! Seams the worker is built against.
//!
//! The worker takes these as trait objects so tests can substitute fakes
//! and drive every scenario without a live broker.

use std::time::Duration;

use async_trait::async_trait;

use storygen_models::{JobStatusSnapshot, ProgressEvent, StatusEvent};

use crate::error::QueueResult;
use crate::job::{Delivery, QueueJob};
use crate::progress::ProgressChannel;
use crate::queue::JobQueue;

/// Work distribution: claim, settle, and recover deliveries.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Blocking claim of the next delivery, bounded by `block`.
    async fn fetch(&self, consumer: &str, block: Duration) -> QueueResult<Option<Delivery>>;

    /// Settle a delivery after terminal processing.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Hand an in-flight job back to the pool (graceful shutdown).
    async fn requeue(&self, message_id: &str, job: &QueueJob) -> QueueResult<String>;

    /// Reclaim deliveries abandoned by dead consumers.
    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Broker connectivity probe.
    async fn ping(&self) -> QueueResult<()>;
}

#[async_trait]
impl WorkQueue for JobQueue {
    async fn fetch(&self, consumer: &str, block: Duration) -> QueueResult<Option<Delivery>> {
        JobQueue::fetch(self, consumer, block).await
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        JobQueue::ack(self, message_id).await
    }

    async fn requeue(&self, message_id: &str, job: &QueueJob) -> QueueResult<String> {
        JobQueue::requeue(self, message_id, job).await
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        JobQueue::claim_stale(self, consumer, min_idle, count).await
    }

    async fn ping(&self) -> QueueResult<()> {
        JobQueue::ping(self).await
    }
}

/// Outbound progress reporting. Fire-and-forget from the worker's point of
/// view: failures are logged and swallowed by the caller.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish_status(&self, event: &StatusEvent) -> QueueResult<()>;
    async fn publish_progress(&self, event: &ProgressEvent) -> QueueResult<()>;
    async fn put_snapshot(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()>;
}

#[async_trait]
impl ProgressSink for ProgressChannel {
    async fn publish_status(&self, event: &StatusEvent) -> QueueResult<()> {
        ProgressChannel::publish_status(self, event).await
    }

    async fn publish_progress(&self, event: &ProgressEvent) -> QueueResult<()> {
        ProgressChannel::publish_progress(self, event).await
    }

    async fn put_snapshot(&self, snapshot: &JobStatusSnapshot) -> QueueResult<()> {
        ProgressChannel::put_snapshot(self, snapshot).await
    }
}
