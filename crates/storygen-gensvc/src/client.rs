//! Generation service HTTP client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{GenError, GenResult};
use crate::types::{GenerateRequest, GenerateResponse, HealthResponse};

/// Configuration for the generation service client.
#[derive(Debug, Clone)]
pub struct GenClientConfig {
    /// Base URL of the generation service
    pub base_url: String,
    /// Per-request timeout. Generation calls run for minutes.
    pub timeout: Duration,
}

impl Default for GenClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl GenClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GEN_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            timeout: Duration::from_secs(
                std::env::var("GEN_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Client for the external generation service.
pub struct GenClient {
    http: Client,
    config: GenClientConfig,
}

impl GenClient {
    /// Create a new client.
    pub fn new(config: GenClientConfig) -> GenResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GenError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> GenResult<Self> {
        Self::new(GenClientConfig::from_env())
    }

    /// Check if the generation service is healthy.
    pub async fn health_check(&self) -> GenResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Generation service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Generation service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Invoke one stage. Single shot: retry decisions belong to the caller.
    pub async fn generate(&self, request: &GenerateRequest) -> GenResult<GenerateResponse> {
        let url = format!("{}/v1/generate/{}", self.config.base_url, request.kind);

        debug!(
            job_id = %request.job_id,
            stage = %request.stage,
            "Sending generation request to {}", url
        );

        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<GenerateResponse>()
                .await
                .map_err(|e| GenError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::classify_failure(status, body))
    }

    fn classify_failure(status: StatusCode, body: String) -> GenError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => GenError::RateLimited,
            StatusCode::PAYLOAD_TOO_LARGE => GenError::PayloadTooLarge(body),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                GenError::InvalidInput(body)
            }
            s if s.is_server_error() => GenError::Upstream {
                status: s.as_u16(),
                message: body,
            },
            // Remaining 4xx: the service refused the request permanently.
            _ => GenError::Rejected(format!("{}: {}", status, body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use storygen_models::StageKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_request() -> GenerateRequest {
        GenerateRequest {
            job_id: "job-1".to_string(),
            stage: "script".to_string(),
            kind: StageKind::Script,
            params: Map::new(),
            stage_data: Map::new(),
        }
    }

    async fn client_for(server: &MockServer) -> GenClient {
        GenClient::new(GenClientConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = GenClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8002");
        assert_eq!(config.timeout, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate/script"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "script_url": "s3://bucket/script.json" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = client.generate(&test_request()).await.unwrap();
        assert_eq!(
            response.data.get("script_url").and_then(|v| v.as_str()),
            Some("s3://bucket/script.json")
        );
    }

    #[tokio::test]
    async fn test_rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(&test_request()).await.unwrap_err();
        assert!(matches!(err, GenError::RateLimited));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(&test_request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, GenError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_validation_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad prompt"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(&test_request()).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.error_kind(), storygen_models::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_policy_rejection_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(451).set_body_string("content policy"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate(&test_request()).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.error_kind(), storygen_models::ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_health_check_degraded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(!client.health_check().await.unwrap());
    }
}
