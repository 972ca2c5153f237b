//! Redis Streams job queue and progress channel.
//!
//! This crate provides:
//! - Job enqueueing and consumption via Redis Streams consumer groups
//! - Requeue and stale-delivery reclaim for worker shutdown/crash recovery
//! - Progress events via Redis Pub/Sub (status topic + per-job topic)
//! - A TTL-bounded job status snapshot cache
//! - The `WorkQueue`/`ProgressSink` seams the worker is built against

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;
pub mod traits;

pub use error::{QueueError, QueueResult};
pub use job::{Delivery, QueueJob};
pub use progress::{ProgressChannel, SNAPSHOT_TTL_SECS, STATUS_CHANNEL};
pub use queue::{JobQueue, QueueConfig};
pub use traits::{ProgressSink, WorkQueue};
