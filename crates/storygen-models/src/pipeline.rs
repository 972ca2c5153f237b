//! Pipeline plans: the ordered stage sequence derived from job input.
//!
//! The plan is data, not code. The worker walks whatever sequence the plan
//! yields, so new pipeline shapes only touch this module.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{JobError, JobInput, Product};

/// Upper bound on per-scene clip stages in a scene-reel job.
pub const MAX_SCENES: u64 = 32;

/// Executor capability vocabulary. One external generation capability each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Script,
    Voice,
    Video,
    Composite,
    ScenePlan,
    Clip,
    LipSync,
    Stitch,
}

impl StageKind {
    /// Every capability, for wiring a full executor registry.
    pub const ALL: [StageKind; 8] = [
        StageKind::Script,
        StageKind::Voice,
        StageKind::Video,
        StageKind::Composite,
        StageKind::ScenePlan,
        StageKind::Clip,
        StageKind::LipSync,
        StageKind::Stitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Script => "script",
            StageKind::Voice => "voice",
            StageKind::Video => "video",
            StageKind::Composite => "composite",
            StageKind::ScenePlan => "scene_plan",
            StageKind::Clip => "clip",
            StageKind::LipSync => "lip_sync",
            StageKind::Stitch => "stitch",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stage instance in a job's plan. `name` is unique within the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: StageKind,
}

impl StageDescriptor {
    /// Descriptor for a kind that appears once in a plan.
    pub fn single(kind: StageKind) -> Self {
        Self {
            name: kind.as_str().to_string(),
            kind,
        }
    }

    /// Descriptor for a repeated kind (e.g. one clip per scene).
    pub fn indexed(kind: StageKind, index: u64) -> Self {
        Self {
            name: format!("{}-{}", kind.as_str(), index),
            kind,
        }
    }
}

/// Ordered stage sequence for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PipelinePlan {
    stages: Vec<StageDescriptor>,
}

impl PipelinePlan {
    /// Derive the plan for a job input.
    ///
    /// Scene-reel jobs must carry an integer `scene_count` param in
    /// `1..=MAX_SCENES`; anything else is a fatal input error.
    pub fn for_input(input: &JobInput) -> Result<Self, JobError> {
        let stages = match input.product {
            Product::TemplateVideo => vec![
                StageDescriptor::single(StageKind::Script),
                StageDescriptor::single(StageKind::Voice),
                StageDescriptor::single(StageKind::Video),
                StageDescriptor::single(StageKind::Composite),
            ],
            Product::SceneReel => {
                let count = input
                    .params
                    .get("scene_count")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| {
                        JobError::invalid_input("scene_count is required for scene_reel jobs")
                    })?;
                if count == 0 || count > MAX_SCENES {
                    return Err(JobError::invalid_input(format!(
                        "scene_count must be between 1 and {}, got {}",
                        MAX_SCENES, count
                    )));
                }

                let mut stages = vec![StageDescriptor::single(StageKind::ScenePlan)];
                stages.extend((0..count).map(|i| StageDescriptor::indexed(StageKind::Clip, i)));
                stages.push(StageDescriptor::single(StageKind::LipSync));
                stages.push(StageDescriptor::single(StageKind::Stitch));
                stages
            }
        };

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Overall job progress: the arithmetic mean of per-stage progress.
    ///
    /// Stages without a value yet count as 0, so with stage `i` of `n`
    /// running at `p`%, the mean lands inside the stage's even window
    /// `[i*100/n, (i+1)*100/n]` and callers see smooth overall progress.
    pub fn overall_progress(&self, stage_progress: &[u8]) -> u8 {
        if self.stages.is_empty() {
            return 0;
        }
        let sum: u32 = (0..self.stages.len())
            .map(|i| u32::from(stage_progress.get(i).copied().unwrap_or(0)))
            .sum();
        (sum / self.stages.len() as u32) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobInput;
    use serde_json::json;

    #[test]
    fn test_template_plan_shape() {
        let plan = PipelinePlan::for_input(&JobInput::new(Product::TemplateVideo)).unwrap();
        let names: Vec<_> = plan.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["script", "voice", "video", "composite"]);
    }

    #[test]
    fn test_scene_reel_plan_shape() {
        let input = JobInput::new(Product::SceneReel).with_param("scene_count", json!(3));
        let plan = PipelinePlan::for_input(&input).unwrap();
        let names: Vec<_> = plan.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["scene_plan", "clip-0", "clip-1", "clip-2", "lip_sync", "stitch"]
        );
        assert_eq!(plan.stages()[1].kind, StageKind::Clip);
    }

    #[test]
    fn test_scene_reel_requires_scene_count() {
        let err = PipelinePlan::for_input(&JobInput::new(Product::SceneReel)).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message.contains("scene_count"));
    }

    #[test]
    fn test_scene_count_bounds() {
        for bad in [json!(0), json!(MAX_SCENES + 1), json!("four")] {
            let input = JobInput::new(Product::SceneReel).with_param("scene_count", bad);
            assert!(PipelinePlan::for_input(&input).is_err());
        }
    }

    #[test]
    fn test_overall_progress_mean() {
        let plan = PipelinePlan::for_input(&JobInput::new(Product::TemplateVideo)).unwrap();

        assert_eq!(plan.overall_progress(&[]), 0);
        // First stage halfway: inside the 0-25 window.
        assert_eq!(plan.overall_progress(&[50]), 12);
        // Two stages done, third halfway: inside the 50-75 window.
        assert_eq!(plan.overall_progress(&[100, 100, 50]), 62);
        assert_eq!(plan.overall_progress(&[100, 100, 100, 100]), 100);
    }

    #[test]
    fn test_overall_progress_window_boundaries() {
        let plan = PipelinePlan::for_input(&JobInput::new(Product::TemplateVideo)).unwrap();
        // Stage starts pin overall progress to the window start.
        assert_eq!(plan.overall_progress(&[0, 0, 0, 0]), 0);
        assert_eq!(plan.overall_progress(&[100, 0, 0, 0]), 25);
        assert_eq!(plan.overall_progress(&[100, 100, 0, 0]), 50);
        assert_eq!(plan.overall_progress(&[100, 100, 100, 0]), 75);
    }
}
