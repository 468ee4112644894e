//! Outbound skill result and its wire encoding.
//!
//! Stage outputs are surfaced as distinct top-level fields named by the
//! pipeline's field table rather than as a generic list:
//!
//! ```json
//! {"byakugan": "...", "mode_sage": "...", "execution": "...",
//!  "skills_used": ["dev-expert"], "timing": {"byakugan": 1.2},
//!  "total_time": 3.4}
//! ```
//!
//! `error` is present only when non-empty.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::AppError;

/// Field carrying the terminal artifact.
pub const EXECUTION_FIELD: &str = "execution";

/// Top-level names a stage field may not take.
pub const RESERVED_FIELDS: [&str; 5] = [
    EXECUTION_FIELD,
    "skills_used",
    "timing",
    "total_time",
    "error",
];

/// Output slot of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageField {
    /// Response field name registered for the stage.
    pub field: String,
    /// Stage output; empty if the stage never completed.
    pub content: String,
    /// Wall-clock seconds, `None` if the stage never started.
    pub seconds: Option<f64>,
}

/// Response written back for every accepted connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillResult {
    /// Stage outputs in pipeline order.
    pub stages: Vec<StageField>,
    /// Terminal artifact; populated only on full success.
    pub execution: String,
    /// Sub-skill identifiers in invocation order, duplicates kept.
    pub skills_used: Vec<String>,
    /// Sum of per-stage durations in seconds.
    pub total_time: f64,
    /// Failure reason; empty on success.
    pub error: String,
}

impl SkillResult {
    /// Result that carries only an error, for requests that never reached a pipeline.
    #[must_use]
    pub fn failure(err: &AppError) -> Self {
        Self {
            error: err.to_string(),
            ..Self::default()
        }
    }

    /// Whether every stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Output recorded under `field`, if the pipeline declares that field.
    #[must_use]
    pub fn stage(&self, field: &str) -> Option<&str> {
        self.stages
            .iter()
            .find(|stage| stage.field == field)
            .map(|stage| stage.content.as_str())
    }
}

impl Serialize for SkillResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let extra = if self.error.is_empty() { 4 } else { 5 };
        let mut map = serializer.serialize_map(Some(self.stages.len() + extra))?;
        for stage in &self.stages {
            map.serialize_entry(&stage.field, &stage.content)?;
        }
        map.serialize_entry(EXECUTION_FIELD, &self.execution)?;
        map.serialize_entry("skills_used", &self.skills_used)?;
        map.serialize_entry("timing", &Timing(&self.stages))?;
        map.serialize_entry("total_time", &self.total_time)?;
        if !self.error.is_empty() {
            map.serialize_entry("error", &self.error)?;
        }
        map.end()
    }
}

/// Per-stage seconds, limited to stages that started.
struct Timing<'a>(&'a [StageField]);

impl Serialize for Timing<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for stage in self.0 {
            if let Some(seconds) = stage.seconds {
                map.serialize_entry(&stage.field, &seconds)?;
            }
        }
        map.end()
    }
}
