//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(#[from] storygen_queue::QueueError),

    #[error("Store error: {0}")]
    Store(#[from] storygen_store::StoreError),

    #[error("Generation service error: {0}")]
    GenService(#[from] storygen_gensvc::GenError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the operation that produced this error is worth retrying.
    ///
    /// Broker/store connectivity problems are transient by assumption; they
    /// surface through the health check if they persist.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Queue(_) | WorkerError::Store(_) => true,
            WorkerError::GenService(e) => e.is_retryable(),
            WorkerError::JobFailed(_) | WorkerError::Config(_) | WorkerError::Io(_) => false,
        }
    }
}
