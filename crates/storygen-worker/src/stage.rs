//! The stage executor seam.
//!
//! Stage executors are external collaborators: each wraps one call to a
//! generation capability. The worker treats them as opaque, retryable
//! operations that either return output data or a failure tagged
//! retryable/fatal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use storygen_models::{ErrorKind, JobError, JobId, JobInput, StageKind};

/// Everything an executor receives: the job's input plus the accumulated
/// output data of prior stages.
pub struct StageContext<'a> {
    pub job_id: &'a JobId,
    /// Stage instance name (unique within the job, e.g. `clip-2`)
    pub stage: &'a str,
    pub input: &'a JobInput,
    pub stage_data: &'a Map<String, Value>,
}

/// Output mapping merged into the job's accumulated stage data.
pub type StageOutput = Map<String, Value>;

/// Structured executor failure.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Normally derived from the kind; executors may force `false`.
    pub retryable: bool,
}

impl StageFailure {
    /// Failure whose retryability follows the error kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    /// Failure explicitly flagged non-retryable regardless of kind.
    pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
        }
    }

    /// The persisted error record for this failure.
    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.kind, self.message.clone())
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One pipeline capability. Implementations call an external generation
/// service; the worker never looks inside.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageFailure>;
}

/// Maps stage kinds to their executors.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<StageKind, Arc<dyn StageExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: StageKind, executor: Arc<dyn StageExecutor>) -> Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn get(&self, kind: StageKind) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopExecutor;

    #[async_trait]
    impl StageExecutor for NoopExecutor {
        async fn execute(&self, _ctx: StageContext<'_>) -> Result<StageOutput, StageFailure> {
            Ok(Map::new())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry =
            ExecutorRegistry::new().register(StageKind::Script, Arc::new(NoopExecutor));
        assert!(registry.get(StageKind::Script).is_some());
        assert!(registry.get(StageKind::Voice).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failure_retryability_follows_kind() {
        assert!(StageFailure::new(ErrorKind::Timeout, "t").retryable);
        assert!(!StageFailure::new(ErrorKind::InvalidInput, "i").retryable);
        assert!(!StageFailure::fatal(ErrorKind::Timeout, "forced").retryable);
    }
}
