//! Staged pipeline abstraction, executor, and the skill registry.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`] implementations, each
//! bound to the response field its output is published under. The
//! [`executor::PipelineExecutor`] runs them strictly in sequence under a
//! deadline, and the [`registry::SkillRegistry`] maps `(package, function)`
//! to a pipeline.

pub mod executor;
pub mod registry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::models::Request;
use crate::Result;

/// Boxed future returned by [`Stage::run`].
pub type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<StageOutput>> + Send + 'a>>;

/// One unit of pipeline work.
///
/// Implementations receive the original request and every prior stage's
/// output, and report the sub-skills they invoked. Durations are measured
/// by the executor, not by the stage.
pub trait Stage: Send + Sync {
    /// Identifier used in logs and failure messages.
    fn name(&self) -> &str;

    /// Execute the stage.
    ///
    /// # Errors
    ///
    /// Any error halts the pipeline; its `Display` becomes part of the
    /// response's `error` field.
    fn run<'a>(&'a self, input: &'a StageInput<'a>) -> StageFuture<'a>;
}

/// What a stage produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    /// Text published under the stage's response field.
    pub content: String,
    /// Sub-skill identifiers invoked while producing `content`.
    pub skills_used: Vec<String>,
}

impl StageOutput {
    /// Output with no sub-skills.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            skills_used: Vec::new(),
        }
    }

    /// Attach the sub-skills this stage invoked.
    #[must_use]
    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills_used = skills;
        self
    }
}

/// A completed stage as seen by later stages.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    /// Response field the output belongs to.
    pub field: String,
    /// Stage identifier.
    pub name: String,
    /// Stage output text.
    pub content: String,
    /// Wall-clock duration of the stage.
    pub duration: Duration,
}

/// Read-only view handed to a running stage.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// The request being served.
    pub request: &'a Request,
    /// Stages completed so far, in order.
    pub prior: &'a [StageRecord],
}

impl<'a> StageInput<'a> {
    /// Positional arguments of the request.
    #[must_use]
    pub fn args(&self) -> &'a [String] {
        &self.request.args
    }

    /// Output of an earlier stage by response field name.
    #[must_use]
    pub fn prior_output(&self, field: &str) -> Option<&'a str> {
        self.prior
            .iter()
            .find(|record| record.field == field)
            .map(|record| record.content.as_str())
    }

    /// Output of the most recent completed stage.
    #[must_use]
    pub fn last_output(&self) -> Option<&'a str> {
        self.prior.last().map(|record| record.content.as_str())
    }
}

/// A stage bound to its response field.
#[derive(Clone)]
pub struct PipelineStage {
    field: String,
    stage: Arc<dyn Stage>,
}

impl PipelineStage {
    /// Response field name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Stage implementation.
    #[must_use]
    pub fn stage(&self) -> &dyn Stage {
        self.stage.as_ref()
    }
}

/// Ordered list of named stages.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<PipelineStage>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("fields", &self.fields().collect::<Vec<_>>())
            .finish()
    }
}

impl Pipeline {
    /// Start an empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage published under the positional field `stage<N>_output`.
    #[must_use]
    pub fn stage(self, stage: impl Stage + 'static) -> Self {
        let field = format!("stage{}_output", self.stages.len() + 1);
        self.named_stage(field, stage)
    }

    /// Append a stage published under `field`.
    #[must_use]
    pub fn named_stage(mut self, field: impl Into<String>, stage: impl Stage + 'static) -> Self {
        self.stages.push(PipelineStage {
            field: field.into(),
            stage: Arc::new(stage),
        });
        self
    }

    /// Pipeline identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Response field names in execution order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(PipelineStage::field)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
