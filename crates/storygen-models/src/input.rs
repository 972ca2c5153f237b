//! Job input envelope.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Product variant a job was submitted for. Selects the pipeline shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    /// Fixed four-stage pipeline: script, voice, video, composite
    TemplateVideo,
    /// Scene-based pipeline with one clip stage per scene
    SceneReel,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::TemplateVideo => "template_video",
            Product::SceneReel => "scene_reel",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generation parameters submitted by the caller.
///
/// `params` is opaque to the coordinator: it is handed to stage executors
/// untouched. The single exception is pipeline derivation, which reads the
/// fields `PipelinePlan::for_input` documents.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobInput {
    pub product: Product,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl JobInput {
    pub fn new(product: Product) -> Self {
        Self {
            product,
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_serde() {
        let input = JobInput::new(Product::TemplateVideo)
            .with_param("style", Value::String("noir".into()));
        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains("\"template_video\""));
        assert!(json.contains("\"noir\""));

        let back: JobInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.product, Product::TemplateVideo);
        assert_eq!(back.params.get("style"), Some(&Value::String("noir".into())));
    }

    #[test]
    fn test_params_default_empty() {
        let back: JobInput = serde_json::from_str(r#"{"product":"scene_reel"}"#).unwrap();
        assert_eq!(back.product, Product::SceneReel);
        assert!(back.params.is_empty());
    }
}
