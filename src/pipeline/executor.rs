//! Sequential stage execution under a deadline.
//!
//! ```text
//! Idle → Running(0) → Running(1) → … → Complete
//!                 ↘ Failed(k)
//!                 ↘ TimedOut(k)
//! ```
//!
//! A failed stage is fatal to the run; nothing is retried. On deadline
//! expiry the in-flight stage future is dropped, so its work is abandoned
//! rather than awaited, and whatever earlier stages produced is returned.

use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn, Instrument};

use super::{Pipeline, StageInput, StageOutput, StageRecord};
use crate::models::{Request, SkillResult, StageField};
use crate::AppError;

/// Position of a run in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No stage has started.
    Idle,
    /// Stage at this index is executing.
    Running(usize),
    /// Every stage completed.
    Complete,
    /// Stage at this index returned an error.
    Failed(usize),
    /// Deadline expired while the stage at this index was executing.
    TimedOut(usize),
}

impl RunState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_) | Self::TimedOut(_))
    }
}

/// Accumulated state of one pipeline run.
///
/// Lives outside the deadline-bounded future so partial progress survives
/// cancellation.
#[derive(Debug)]
pub struct PipelineRun {
    state: RunState,
    records: Vec<StageRecord>,
    skills_used: Vec<String>,
    total: Duration,
    in_flight: Option<Instant>,
    /// Index and elapsed time of a stage that started but never completed.
    unfinished: Option<(usize, Duration)>,
    error: Option<AppError>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    /// Fresh run in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            records: Vec::new(),
            skills_used: Vec::new(),
            total: Duration::ZERO,
            in_flight: None,
            unfinished: None,
            error: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Completed stage records.
    #[must_use]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Sum of durations of every stage that started.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.total
    }

    fn begin(&mut self, index: usize) {
        self.state = RunState::Running(index);
        self.in_flight = Some(Instant::now());
    }

    fn stop_clock(&mut self) -> Duration {
        let elapsed = self
            .in_flight
            .take()
            .map_or(Duration::ZERO, |started| started.elapsed());
        self.total += elapsed;
        elapsed
    }

    fn complete_stage(&mut self, field: &str, name: &str, output: StageOutput) {
        let duration = self.stop_clock();
        self.skills_used.extend(output.skills_used);
        self.records.push(StageRecord {
            field: field.to_owned(),
            name: name.to_owned(),
            content: output.content,
            duration,
        });
    }

    fn fail_stage(&mut self, index: usize, name: &str, err: &AppError) {
        let elapsed = self.stop_clock();
        self.unfinished = Some((index, elapsed));
        self.state = RunState::Failed(index);
        self.error = Some(AppError::Stage(format!("{name} failed: {err}")));
    }

    fn time_out(&mut self, deadline: Duration, pipeline: &Pipeline) {
        let RunState::Running(index) = self.state else {
            return;
        };
        let elapsed = self.stop_clock();
        self.unfinished = Some((index, elapsed));
        self.state = RunState::TimedOut(index);
        let stage = pipeline
            .stages()
            .get(index)
            .map_or("unknown", |slot| slot.stage().name());
        self.error = Some(AppError::Timeout(format!(
            "pipeline exceeded {deadline:?} deadline during stage {stage}"
        )));
    }

    /// Project the run onto the response model.
    #[must_use]
    pub fn into_result(self, pipeline: &Pipeline) -> SkillResult {
        let stages = pipeline
            .stages()
            .iter()
            .enumerate()
            .map(|(index, slot)| match self.records.get(index) {
                Some(record) => StageField {
                    field: record.field.clone(),
                    content: record.content.clone(),
                    seconds: Some(record.duration.as_secs_f64()),
                },
                None => StageField {
                    field: slot.field().to_owned(),
                    content: String::new(),
                    seconds: self
                        .unfinished
                        .filter(|(unfinished, _)| *unfinished == index)
                        .map(|(_, elapsed)| elapsed.as_secs_f64()),
                },
            })
            .collect();

        let execution = if self.state == RunState::Complete {
            self.records
                .last()
                .map(|record| record.content.clone())
                .unwrap_or_default()
        } else {
            String::new()
        };

        SkillResult {
            stages,
            execution,
            skills_used: self.skills_used,
            total_time: self.total.as_secs_f64(),
            error: self.error.map(|err| err.to_string()).unwrap_or_default(),
        }
    }
}

/// Runs pipelines with a fixed per-run deadline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineExecutor {
    deadline: Duration,
}

impl PipelineExecutor {
    /// Executor enforcing `deadline` on every run.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Configured deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run every stage of `pipeline` against `request`.
    ///
    /// Never fails: stage errors and deadline expiry are reported through
    /// the result's `error` field alongside the partial outputs.
    pub async fn execute(&self, pipeline: &Pipeline, request: &Request) -> SkillResult {
        let span = info_span!("pipeline", pipeline = %pipeline.name(), skill = %request.skill_key());
        async move {
            let mut run = PipelineRun::new();
            let outcome =
                tokio::time::timeout(self.deadline, run_stages(pipeline, request, &mut run)).await;

            if outcome.is_err() {
                run.time_out(self.deadline, pipeline);
                warn!(deadline = ?self.deadline, state = ?run.state(), "pipeline deadline exceeded");
            }

            match run.state() {
                RunState::Complete => info!(
                    total_secs = run.total().as_secs_f64(),
                    "pipeline complete"
                ),
                state => info!(?state, total_secs = run.total().as_secs_f64(), "pipeline halted"),
            }

            run.into_result(pipeline)
        }
        .instrument(span)
        .await
    }
}

async fn run_stages(pipeline: &Pipeline, request: &Request, run: &mut PipelineRun) {
    for (index, slot) in pipeline.stages().iter().enumerate() {
        let name = slot.stage().name();
        run.begin(index);
        debug!(stage = name, index, "stage started");

        let outcome = {
            let input = StageInput {
                request,
                prior: &run.records,
            };
            slot.stage().run(&input).await
        };

        match outcome {
            Ok(output) => {
                run.complete_stage(slot.field(), name, output);
                debug!(stage = name, index, "stage complete");
            }
            Err(err) => {
                warn!(stage = name, index, %err, "stage failed");
                run.fail_stage(index, name, &err);
                return;
            }
        }
    }
    run.state = RunState::Complete;
}
