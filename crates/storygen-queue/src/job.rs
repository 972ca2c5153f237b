//! Wire envelope for queued jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storygen_models::{JobId, JobInput};

/// The record pushed onto the durable queue by the enqueuing collaborator.
///
/// Minimal by design: an identity plus the opaque input payload. Everything
/// else about the job lives in the persistent store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub job_id: JobId,
    pub input: JobInput,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn new(job_id: JobId, input: JobInput) -> Self {
        Self {
            job_id,
            input,
            enqueued_at: Utc::now(),
        }
    }
}

/// One delivery claimed from the queue: the broker message id plus the
/// decoded job. The message id is what gets acked or requeued.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub job: QueueJob,
}

#[cfg(test)]
mod tests {
    use super::*;
    use storygen_models::Product;

    #[test]
    fn test_envelope_round_trip() {
        let job = QueueJob::new(
            JobId::from_string("job-1"),
            JobInput::new(Product::TemplateVideo),
        );
        let json = serde_json::to_string(&job).unwrap();
        let back: QueueJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, job.job_id);
        assert_eq!(back.input.product, Product::TemplateVideo);
    }
}
