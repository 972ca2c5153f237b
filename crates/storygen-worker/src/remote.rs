//! Stage executors backed by the external generation service.

use std::sync::Arc;

use async_trait::async_trait;

use storygen_gensvc::{GenClient, GenerateRequest};
use storygen_models::StageKind;

use crate::stage::{ExecutorRegistry, StageContext, StageExecutor, StageFailure, StageOutput};

/// Bridges one stage kind to the generation service.
pub struct RemoteStageExecutor {
    client: Arc<GenClient>,
    kind: StageKind,
}

impl RemoteStageExecutor {
    pub fn new(client: Arc<GenClient>, kind: StageKind) -> Self {
        Self { client, kind }
    }
}

#[async_trait]
impl StageExecutor for RemoteStageExecutor {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageFailure> {
        let request = GenerateRequest {
            job_id: ctx.job_id.to_string(),
            stage: ctx.stage.to_string(),
            kind: self.kind,
            params: ctx.input.params.clone(),
            stage_data: ctx.stage_data.clone(),
        };

        match self.client.generate(&request).await {
            Ok(response) => Ok(response.data),
            Err(e) => Err(StageFailure {
                kind: e.error_kind(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            }),
        }
    }
}

/// Registry wiring every capability to the generation service.
pub fn remote_registry(client: Arc<GenClient>) -> ExecutorRegistry {
    StageKind::ALL.iter().fold(
        ExecutorRegistry::new(),
        |registry, kind| {
            registry.register(*kind, Arc::new(RemoteStageExecutor::new(client.clone(), *kind)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use storygen_gensvc::GenClientConfig;

    #[test]
    fn test_remote_registry_covers_all_kinds() {
        let client = Arc::new(GenClient::new(GenClientConfig::default()).unwrap());
        let registry = remote_registry(client);
        for kind in StageKind::ALL {
            assert!(registry.get(kind).is_some(), "missing executor for {kind}");
        }
    }
}
