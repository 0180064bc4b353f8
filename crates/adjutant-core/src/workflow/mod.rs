//! Workflow orchestration.
//!
//! A small, domain-agnostic engine for three coordination patterns:
//!
//! - **Sequential pipeline**: stages run in declared order, each seeing
//!   the accumulated outputs of every prior stage.
//! - **Parallel fan-out/join**: independent stages run concurrently; a
//!   barrier join merges their outputs before anything downstream runs.
//! - **Bounded retry loop** (see [`retry`]): re-invoke a stage with
//!   successive candidate inputs until it succeeds or attempts run out.
//!
//! Run state machine:
//!
//! ```text
//! Pending -> Running -> (Succeeded | PartiallyFailed | Failed | Cancelled)
//! ```
//!
//! Terminal states are final; a run is never resumed. The run context is
//! owned and mutated exclusively by the orchestrator; stages only ever
//! see immutable snapshots.

mod retry;
mod stage;

pub use retry::{run_retry_loop, RetryOutcome, RetryPolicy, RetrySpec};
pub use stage::{CancelFlag, Stage, StageContext, StageFailure};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::WorkflowError;

/// Run-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    /// At least one stage degraded; every successful output is still
    /// present in the run.
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallyFailed => "partially_failed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What one stage left behind in its slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    /// The stage produced its payload.
    Completed { value: Value },
    /// The stage degraded: the failure is recorded and the run went on.
    Unavailable { reason: String },
}

impl StageOutput {
    pub fn value(&self) -> Option<&Value> {
        match self {
            StageOutput::Completed { value } => Some(value),
            StageOutput::Unavailable { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutput::Unavailable { .. })
    }
}

/// One orchestrated run: identity, per-stage slots, terminal status.
///
/// Mutated only by the orchestrator appending slots; callers receive it
/// back once the run reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub status: RunStatus,
    pub stage_outputs: BTreeMap<String, StageOutput>,
}

impl WorkflowRun {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            status: RunStatus::Pending,
            stage_outputs: BTreeMap::new(),
        }
    }

    /// A completed stage's payload, if that stage completed.
    pub fn output(&self, stage: &str) -> Option<&Value> {
        self.stage_outputs.get(stage).and_then(StageOutput::value)
    }

    /// Names of stages that degraded, with the recorded reasons.
    pub fn degraded_stages(&self) -> Vec<(&str, &str)> {
        self.stage_outputs
            .iter()
            .filter_map(|(name, slot)| match slot {
                StageOutput::Unavailable { reason } => Some((name.as_str(), reason.as_str())),
                StageOutput::Completed { .. } => None,
            })
            .collect()
    }

    fn completed_values(&self) -> BTreeMap<String, Value> {
        self.stage_outputs
            .iter()
            .filter_map(|(name, slot)| slot.value().map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

/// Failure policy for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First stage failure ends the run as Failed; later stages skipped.
    FailFast,
    /// Unavailable stages are recorded and the run continues, ending
    /// PartiallyFailed if anything degraded. Malformed input still fails
    /// the run: degrade covers missing data, not bad data.
    Degrade,
}

/// One step of a pipeline: a single stage or a fan-out group.
enum Step {
    Single(Arc<dyn Stage>),
    FanOut(Vec<Arc<dyn Stage>>),
}

impl Step {
    fn stages(&self) -> Vec<&Arc<dyn Stage>> {
        match self {
            Step::Single(stage) => vec![stage],
            Step::FanOut(stages) => stages.iter().collect(),
        }
    }
}

/// A validated sequence of steps.
///
/// Wiring is checked at construction, not at call time: duplicate output
/// names are rejected, and every key a stage declares in `reads()` must
/// be produced by an earlier step. Stages inside the same fan-out group
/// cannot read each other (their outputs only exist after the join).
pub struct Pipeline {
    steps: Vec<Step>,
    policy: FailurePolicy,
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    steps: Vec<Step>,
    policy: FailurePolicy,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder {
            steps: Vec::new(),
            policy: FailurePolicy::Degrade,
        }
    }
}

impl PipelineBuilder {
    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append one sequential stage.
    pub fn then(mut self, stage: Arc<dyn Stage>) -> Self {
        self.steps.push(Step::Single(stage));
        self
    }

    /// Append a group of independent stages that run concurrently and
    /// join before the next step.
    pub fn fan_out(mut self, stages: Vec<Arc<dyn Stage>>) -> Self {
        self.steps.push(Step::FanOut(stages));
        self
    }

    /// Validate wiring and produce the pipeline.
    pub fn build(self) -> Result<Pipeline, WorkflowError> {
        let mut produced: BTreeSet<String> = BTreeSet::new();

        for step in &self.steps {
            // Reads resolve against outputs of strictly earlier steps.
            for stage in step.stages() {
                for key in stage.reads() {
                    if !produced.contains(&key) {
                        return Err(WorkflowError::InvalidWiring {
                            stage: stage.name().to_string(),
                            message: format!("reads '{}' which no prior step produces", key),
                        });
                    }
                }
            }
            for stage in step.stages() {
                if !produced.insert(stage.name().to_string()) {
                    return Err(WorkflowError::DuplicateOutputKey {
                        key: stage.name().to_string(),
                    });
                }
            }
        }

        Ok(Pipeline {
            steps: self.steps,
            policy: self.policy,
        })
    }
}

/// Executes pipelines. Owns each [`WorkflowRun`] for the duration of its
/// execution; stages only ever receive context snapshots.
pub struct Orchestrator {
    cancel: CancelFlag,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            cancel: CancelFlag::new(),
        }
    }

    /// Create with an externally held cancellation flag.
    pub fn with_cancel_flag(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute a pipeline to a terminal run.
    ///
    /// Cancellation is cooperative: the flag is checked before each step
    /// and after each join. A fan-out branch that already started is
    /// allowed to finish, but its result is discarded when the run was
    /// cancelled in the meantime.
    pub async fn execute(&self, pipeline: &Pipeline) -> WorkflowRun {
        let mut run = WorkflowRun::new();
        run.status = RunStatus::Running;
        info!(run_id = %run.run_id, steps = pipeline.steps.len(), "run started");

        let mut degraded = false;

        for step in &pipeline.steps {
            if self.cancel.is_cancelled() {
                run.status = RunStatus::Cancelled;
                info!(run_id = %run.run_id, "run cancelled at step boundary");
                return run;
            }

            let ctx = StageContext::snapshot(run.completed_values());
            let outcome = match step {
                Step::Single(stage) => self.run_single(&run.run_id, stage, &ctx).await,
                Step::FanOut(stages) => self.run_fan_out(&run.run_id, stages, &ctx).await,
            };

            if self.cancel.is_cancelled() {
                // Cancelled while the step was in flight: the step was
                // allowed to finish but its results are discarded. Slots
                // from earlier steps stay intact.
                run.status = RunStatus::Cancelled;
                info!(run_id = %run.run_id, "run cancelled mid-step, step results discarded");
                return run;
            }

            for (name, result) in outcome {
                match result {
                    Ok(value) => {
                        run.stage_outputs
                            .insert(name, StageOutput::Completed { value });
                    }
                    Err(StageFailure::Unavailable { reason }) => {
                        if pipeline.policy == FailurePolicy::FailFast {
                            warn!(run_id = %run.run_id, stage = %name, %reason, "run failed fast");
                            run.stage_outputs
                                .insert(name, StageOutput::Unavailable { reason });
                            run.status = RunStatus::Failed;
                            return run;
                        }
                        warn!(run_id = %run.run_id, stage = %name, %reason, "stage degraded");
                        run.stage_outputs
                            .insert(name, StageOutput::Unavailable { reason });
                        degraded = true;
                    }
                    Err(StageFailure::Malformed { reason }) => {
                        // Bad data is never degradable.
                        warn!(run_id = %run.run_id, stage = %name, %reason, "malformed input");
                        run.stage_outputs
                            .insert(name, StageOutput::Unavailable { reason });
                        run.status = RunStatus::Failed;
                        return run;
                    }
                    Err(StageFailure::Cancelled) => {
                        run.status = RunStatus::Cancelled;
                        return run;
                    }
                }
            }
        }

        run.status = if degraded {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Succeeded
        };
        info!(run_id = %run.run_id, status = %run.status, "run finished");
        run
    }

    async fn run_single(
        &self,
        run_id: &str,
        stage: &Arc<dyn Stage>,
        ctx: &StageContext,
    ) -> Vec<(String, Result<Value, StageFailure>)> {
        debug!(run_id, stage = stage.name(), "stage started");
        let result = stage.run(ctx).await;
        vec![(stage.name().to_string(), result)]
    }

    /// Run a fan-out group to the barrier join.
    ///
    /// Every branch gets the same pre-step snapshot, so completion order
    /// is unobservable: the merged map is identical no matter which
    /// branch finished first. A failed branch never blocks its siblings.
    async fn run_fan_out(
        &self,
        run_id: &str,
        stages: &[Arc<dyn Stage>],
        ctx: &StageContext,
    ) -> Vec<(String, Result<Value, StageFailure>)> {
        debug!(run_id, branches = stages.len(), "fan-out started");

        let handles: Vec<_> = stages
            .iter()
            .map(|stage| {
                let stage = Arc::clone(stage);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let result = stage.run(&ctx).await;
                    (stage.name().to_string(), result)
                })
            })
            .collect();

        // Barrier join: wait for every branch, in declaration order, so
        // the merged output set is deterministic.
        let mut results = Vec::with_capacity(handles.len());
        for (stage, handle) in stages.iter().zip(handles) {
            match handle.await {
                Ok(named) => results.push(named),
                Err(join_err) => {
                    // A panicked branch is recorded like any other failed
                    // branch; its siblings' results are already in hand.
                    results.push((
                        stage.name().to_string(),
                        Err(StageFailure::unavailable(format!(
                            "branch aborted: {}",
                            join_err
                        ))),
                    ));
                }
            }
        }
        results
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
