//! Generation service error types.

use thiserror::Error;

use storygen_models::ErrorKind;

pub type GenResult<T> = Result<T, GenError>;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("Generation request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("Rate limited by generation service")]
    RateLimited,

    #[error("Generation service unavailable ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GenError {
    /// Whether another attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenError::Timeout | GenError::Network(_) | GenError::RateLimited | GenError::Upstream { .. }
        )
    }

    /// Map into the shared error taxonomy for persistence.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            GenError::Timeout => ErrorKind::Timeout,
            GenError::Network(_) => ErrorKind::Network,
            GenError::RateLimited => ErrorKind::RateLimited,
            GenError::Upstream { .. } => ErrorKind::UpstreamUnavailable,
            GenError::InvalidInput(_) => ErrorKind::InvalidInput,
            GenError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            GenError::Rejected(_) => ErrorKind::Rejected,
            GenError::InvalidResponse(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for GenError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenError::Timeout
        } else {
            GenError::Network(e)
        }
    }
}
