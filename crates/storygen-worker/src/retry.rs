//! Retry policy with exponential backoff.

use std::time::Duration;

use tracing::{debug, warn};

use crate::stage::StageFailure;

/// Decision for a failed stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the delay, then re-enter the stage.
    Retry { delay: Duration },
    /// Terminal: fail the stage and the job.
    Fail,
}

/// Attempt-indexed exponential backoff, capped in count and delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per stage, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (1-based):
    /// base, 2*base, 4*base, ... capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.pow(exponent));
        delay.min(self.max_delay)
    }

    /// Decide what to do after `attempt` attempts ended in `failure`.
    pub fn decide(&self, failure: &StageFailure, attempt: u32) -> RetryDecision {
        if !failure.retryable {
            debug!("Failure is fatal, not retrying: {}", failure);
            return RetryDecision::Fail;
        }
        if attempt >= self.max_attempts {
            debug!(
                "Attempts exhausted ({}/{}), not retrying",
                attempt, self.max_attempts
            );
            return RetryDecision::Fail;
        }
        RetryDecision::Retry {
            delay: self.delay_for_attempt(attempt),
        }
    }
}

/// State tracker for repeated operations that may fail intermittently.
///
/// Used by the dequeue loop so a flapping broker does not flood the logs:
/// after `max_logged_failures` consecutive failures, further ones are
/// suppressed until the next success.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    /// Create a new failure tracker.
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    /// Get the current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storygen_models::ErrorKind;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        };

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(60));
        // Large attempt numbers must not overflow.
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_fatal_failure_never_retries() {
        let policy = RetryPolicy::default();
        let failure = StageFailure::new(ErrorKind::Rejected, "content policy");

        assert_eq!(policy.decide(&failure, 1), RetryDecision::Fail);
    }

    #[test]
    fn test_retryable_failure_respects_attempt_ceiling() {
        let policy = RetryPolicy::default();
        let failure = StageFailure::new(ErrorKind::Timeout, "deadline");

        assert_eq!(
            policy.decide(&failure, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            policy.decide(&failure, 2),
            RetryDecision::Retry {
                delay: Duration::from_secs(4)
            }
        );
        assert_eq!(policy.decide(&failure, 3), RetryDecision::Fail);
    }

    #[test]
    fn test_explicit_fatal_flag_overrides_kind() {
        let policy = RetryPolicy::default();
        // A kind that would normally retry, flagged fatal by the executor.
        let failure = StageFailure::fatal(ErrorKind::UpstreamUnavailable, "gave up");

        assert_eq!(policy.decide(&failure, 1), RetryDecision::Fail);
    }

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new(3);

        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(tracker.record_failure());

        // 4th failure triggers suppression (returns false).
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }
}
