//! Pipeline, babysitter policy and sequence specifications.

use crate::errors::ConduitError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a babysitter recovers from a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RerunStrategy {
    /// Rerun the failed jobs of the first failed stage.
    #[default]
    RerunStage,
    /// Trigger the whole pipeline again.
    RerunPipeline,
}

impl std::fmt::Display for RerunStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RerunStage => write!(f, "RERUN_STAGE"),
            Self::RerunPipeline => write!(f, "RERUN_PIPELINE"),
        }
    }
}

/// Recovery policy for the babysitter watching one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BabysitterPolicy {
    /// Seconds to wait after seeing a failure before rerunning.
    #[serde(default)]
    pub delay_before_rerun_seconds: u64,
    /// What to rerun.
    #[serde(default)]
    pub rerun_strategy: RerunStrategy,
}

impl BabysitterPolicy {
    /// Creates a policy that reruns immediately with the given strategy.
    #[must_use]
    pub fn new(rerun_strategy: RerunStrategy) -> Self {
        Self {
            delay_before_rerun_seconds: 0,
            rerun_strategy,
        }
    }

    /// Sets the delay before a rerun.
    #[must_use]
    pub fn with_delay_seconds(mut self, seconds: u64) -> Self {
        self.delay_before_rerun_seconds = seconds;
        self
    }

    /// Returns the rerun delay as a Duration.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_before_rerun_seconds)
    }
}

/// Specification for one pipeline in a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The pipeline name, matched case-insensitively against dashboard headings.
    pub pipeline_name: String,
    /// Stage that must pass before the sequence moves on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_completion_stage: Option<String>,
    /// Last stage the babysitter cares about. All stages when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_stage: Option<String>,
    /// Recovery policy. Failures are observed but never rerun when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub babysitter: Option<BabysitterPolicy>,
}

impl PipelineSpec {
    /// Creates a new pipeline specification.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            minimum_completion_stage: None,
            completion_stage: None,
            babysitter: None,
        }
    }

    /// Sets the minimum completion stage.
    #[must_use]
    pub fn with_minimum_completion_stage(mut self, stage: impl Into<String>) -> Self {
        self.minimum_completion_stage = Some(stage.into());
        self
    }

    /// Sets the completion stage.
    #[must_use]
    pub fn with_completion_stage(mut self, stage: impl Into<String>) -> Self {
        self.completion_stage = Some(stage.into());
        self
    }

    /// Sets the babysitter policy.
    #[must_use]
    pub fn with_babysitter(mut self, policy: BabysitterPolicy) -> Self {
        self.babysitter = Some(policy);
        self
    }

    /// Checks that the pipeline and stage names are set.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline name or a configured stage name is
    /// empty or whitespace-only.
    pub fn validate(&self) -> Result<(), ConduitError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(ConduitError::Config(
                "Pipeline name cannot be empty or whitespace-only".to_string(),
            ));
        }

        let stages = [&self.minimum_completion_stage, &self.completion_stage];
        if stages.iter().any(|s| s.as_deref().is_some_and(|s| s.trim().is_empty())) {
            return Err(ConduitError::Config(format!(
                "Pipeline '{}' has an empty stage name",
                self.pipeline_name
            )));
        }

        Ok(())
    }
}

/// One step of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineStep {
    /// Pipelines triggered together; the step completes when every member
    /// reaches its own minimum completion stage.
    Parallel(Vec<PipelineSpec>),
    /// A single pipeline.
    Serial(PipelineSpec),
}

impl PipelineStep {
    /// Returns the pipelines in this step.
    #[must_use]
    pub fn members(&self) -> &[PipelineSpec] {
        match self {
            Self::Serial(spec) => std::slice::from_ref(spec),
            Self::Parallel(specs) => specs,
        }
    }

    /// Returns true for a parallel group.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel(_))
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineSequence {
    steps: Vec<PipelineStep>,
}

impl PipelineSequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a serial step.
    #[must_use]
    pub fn then(mut self, spec: PipelineSpec) -> Self {
        self.steps.push(PipelineStep::Serial(spec));
        self
    }

    /// Appends a parallel group.
    #[must_use]
    pub fn then_parallel(mut self, specs: impl IntoIterator<Item = PipelineSpec>) -> Self {
        self.steps.push(PipelineStep::Parallel(specs.into_iter().collect()));
        self
    }

    /// Returns the steps in order.
    #[must_use]
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Returns a sequence without the first `count` steps.
    ///
    /// Useful for resuming a sequence whose early steps already ran.
    #[must_use]
    pub fn skip(&self, count: usize) -> Self {
        Self {
            steps: self.steps.iter().skip(count).cloned().collect(),
        }
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Parses a sequence from JSON: an array whose elements are pipeline
    /// objects or arrays of pipeline objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the sequence is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConduitError> {
        let sequence: Self = serde_json::from_str(json)?;
        sequence.validate()?;
        Ok(sequence)
    }

    /// Validates every spec and rejects empty parallel groups.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<(), ConduitError> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.members().is_empty() {
                return Err(ConduitError::Config(format!(
                    "Step {index} is an empty parallel group"
                )));
            }
            for spec in step.members() {
                spec.validate()?;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a PipelineSequence {
    type Item = &'a PipelineStep;
    type IntoIter = std::slice::Iter<'a, PipelineStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pipeline_spec_builder() {
        let spec = PipelineSpec::new("buildse")
            .with_minimum_completion_stage("compileandpackage")
            .with_completion_stage("destroybuildagents")
            .with_babysitter(BabysitterPolicy::new(RerunStrategy::RerunStage));

        assert_eq!(spec.pipeline_name, "buildse");
        assert_eq!(spec.minimum_completion_stage.as_deref(), Some("compileandpackage"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_pipeline_spec_empty_name() {
        assert!(PipelineSpec::new("").validate().is_err());
        assert!(PipelineSpec::new("   ").validate().is_err());
        assert!(PipelineSpec::new("a").with_completion_stage(" ").validate().is_err());
    }

    #[test]
    fn test_policy_delay() {
        let policy = BabysitterPolicy::new(RerunStrategy::RerunPipeline).with_delay_seconds(30);
        assert_eq!(policy.delay(), Duration::from_secs(30));
        assert_eq!(policy.rerun_strategy.to_string(), "RERUN_PIPELINE");
    }

    #[test]
    fn test_sequence_from_json() {
        let json = r#"[
            {
                "pipeline_name": "deployapps",
                "minimum_completion_stage": "createapp",
                "babysitter": { "delay_before_rerun_seconds": 0, "rerun_strategy": "RERUN_PIPELINE" }
            },
            [
                { "pipeline_name": "updatedns", "minimum_completion_stage": "updatedns" },
                { "pipeline_name": "updateapi", "minimum_completion_stage": "updateapigw" }
            ],
            { "pipeline_name": "runat", "completion_stage": "acceptancetest" }
        ]"#;

        let sequence = PipelineSequence::from_json(json).unwrap();

        assert_eq!(sequence.len(), 3);
        assert!(!sequence.steps()[0].is_parallel());
        assert!(sequence.steps()[1].is_parallel());
        assert_eq!(sequence.steps()[1].members().len(), 2);
        assert_eq!(
            sequence.steps()[0].members()[0].babysitter,
            Some(BabysitterPolicy::new(RerunStrategy::RerunPipeline))
        );
    }

    #[test]
    fn test_sequence_rejects_empty_group() {
        let sequence = PipelineSequence::new().then_parallel(Vec::new());
        assert!(sequence.validate().is_err());
        assert!(PipelineSequence::from_json("[[]]").is_err());
    }

    #[test]
    fn test_sequence_skip() {
        let sequence = PipelineSequence::new()
            .then(PipelineSpec::new("buildse"))
            .then(PipelineSpec::new("deployapps"));

        let rest = sequence.skip(1);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest.steps()[0].members()[0].pipeline_name, "deployapps");
    }
}
