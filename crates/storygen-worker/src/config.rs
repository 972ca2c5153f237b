//! Worker configuration.

use std::time::Duration;

use uuid::Uuid;

use crate::retry::RetryPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifier used for queue consumership and event attribution
    pub worker_id: String,
    /// How long a blocking queue pop waits before yielding to the loop
    pub poll_block: Duration,
    /// Interval between broker/store health checks
    pub health_interval: Duration,
    /// How often the worker scans for stale deliveries (crash recovery)
    pub claim_interval: Duration,
    /// Minimum idle time before a delivery can be reclaimed
    pub claim_min_idle: Duration,
    /// Maximum stale deliveries reclaimed per scan
    pub claim_batch: usize,
    /// Total attempts per stage, including the first
    pub max_attempts: u32,
    /// Base retry delay, doubled per attempt
    pub retry_base_delay: Duration,
    /// Upper bound on a single retry delay
    pub retry_max_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: generated_worker_id(),
            poll_block: Duration::from_secs(1),
            health_interval: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            claim_batch: 5,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            retry_max_delay: Duration::from_secs(60),
        }
    }
}

fn generated_worker_id() -> String {
    format!("worker-{}", Uuid::new_v4())
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// `worker_id` comes from the CLI argument when given, then the
    /// `WORKER_ID` variable, then a generated identifier.
    pub fn from_env(worker_id: Option<String>) -> Self {
        Self {
            worker_id: worker_id
                .or_else(|| std::env::var("WORKER_ID").ok())
                .unwrap_or_else(generated_worker_id),
            poll_block: Duration::from_millis(
                std::env::var("WORKER_POLL_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            health_interval: Duration::from_secs(
                std::env::var("WORKER_HEALTH_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            claim_batch: std::env::var("WORKER_CLAIM_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            max_attempts: std::env::var("WORKER_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_base_delay: Duration::from_millis(
                std::env::var("WORKER_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            retry_max_delay: Duration::from_secs(
                std::env::var("WORKER_RETRY_MAX_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    /// The stage retry policy this config describes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_block, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_secs(2));
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn test_explicit_worker_id_wins() {
        let config = WorkerConfig::from_env(Some("worker-blue".to_string()));
        assert_eq!(config.worker_id, "worker-blue");
    }
}
