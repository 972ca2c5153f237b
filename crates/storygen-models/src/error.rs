//! Error taxonomy shared by the worker, the queue, and the store.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure, used to decide whether a retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Upstream call exceeded its deadline
    Timeout,
    /// Transport-level failure reaching an upstream service
    Network,
    /// Upstream rate limit hit
    RateLimited,
    /// Upstream returned a server-side failure
    UpstreamUnavailable,
    /// Queue broker unreachable
    BrokerUnavailable,
    /// Persistent store unreachable
    StoreUnavailable,
    /// Job input failed validation
    InvalidInput,
    /// Requested format is not supported
    UnsupportedFormat,
    /// Payload exceeds upstream limits
    PayloadTooLarge,
    /// Upstream permanently rejected the request (e.g. content policy)
    Rejected,
    /// Unclassified internal failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::BrokerUnavailable => "broker_unavailable",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether another attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Network
                | ErrorKind::RateLimited
                | ErrorKind::UpstreamUnavailable
                | ErrorKind::BrokerUnavailable
                | ErrorKind::StoreUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error persisted on a failed job or stage.
///
/// This is the only channel through which a caller learns why generation
/// failed; it carries no internal stack traces or credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Error)]
#[error("{kind}: {message}")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::BrokerUnavailable.is_retryable());
        assert!(!ErrorKind::InvalidInput.is_retryable());
        assert!(!ErrorKind::Rejected.is_retryable());
        assert!(!ErrorKind::PayloadTooLarge.is_retryable());
    }

    #[test]
    fn test_serde_round_trip() {
        let err = JobError::new(ErrorKind::RateLimited, "slow down");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"rate_limited\""));
        let back: JobError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
