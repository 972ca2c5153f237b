//! Wire types for the generation service API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use storygen_models::StageKind;

/// One stage invocation: the job's input plus everything earlier stages
/// produced. The service decides what it needs from either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub job_id: String,
    /// Stage instance name (unique within the job, e.g. `clip-2`)
    pub stage: String,
    /// Capability being invoked
    pub kind: StageKind,
    /// Caller-supplied generation parameters
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Accumulated output data from prior stages
    #[serde(default)]
    pub stage_data: Map<String, Value>,
}

/// Stage output: an opaque mapping merged into the job's stage data. The
/// terminal stage conventionally includes `output_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Service health payload.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
