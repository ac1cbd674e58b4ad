//! Sequential step executor: the run loop of the local Docker backend.
//!
//! Executes a compiled deployment strictly in step order, one container at a
//! time, aborting the remaining run on the first failing step. This backend
//! is deliberately single-threaded and synchronous in behavior: step N+1
//! never starts before step N's container has exited, which makes the
//! failure model trivial to reason about for local and dev runs.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{OrchestratorConfig, Stack};
use crate::error::OrchestratorError;
use crate::execution::runner::{ContainerRunner, ContainerRuntime};
use crate::pipeline::deployment::Deployment;
use crate::pipeline::environment::{RunEnvironment, RunId};
use crate::pipeline::spec::StepExecutionSpec;

/// Executor state, observable through [`SequentialStepExecutor::state`].
///
/// `Completed` and `Failed` are terminal for one run; a new `run()` call
/// starts over from `Running(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// No run has started.
    Idle,
    /// The step at this index is currently executing.
    Running(usize),
    /// All steps finished with exit code 0.
    Completed,
    /// The step at this index failed; later steps were never attempted.
    Failed(usize),
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Idle => write!(f, "idle"),
            ExecutorState::Running(index) => write!(f, "running step {index}"),
            ExecutorState::Completed => write!(f, "completed"),
            ExecutorState::Failed(index) => write!(f, "failed at step {index}"),
        }
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step_name: String,
    pub exit_code: i64,
    pub duration: Duration,
    pub log_lines: u64,
}

/// Outcome of one completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    /// Total wall-clock duration of the run. Always ≥ the sum of the step
    /// durations: steps never overlap on this backend.
    pub duration: Duration,
    pub steps: Vec<StepReport>,
}

/// Runs the steps of a deployment sequentially, one Docker container each.
pub struct SequentialStepExecutor {
    runner: ContainerRunner,
    config: OrchestratorConfig,
    state: Mutex<ExecutorState>,
}

impl SequentialStepExecutor {
    /// Creates an executor over the given container runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: OrchestratorConfig,
    ) -> Result<Self, crate::error::ConfigError> {
        config.validate()?;

        Ok(Self {
            runner: ContainerRunner::new(runtime),
            config,
            state: Mutex::new(ExecutorState::Idle),
        })
    }

    /// Current executor state.
    pub fn state(&self) -> ExecutorState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, state: ExecutorState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    /// Executes every step of the deployment, in order, one at a time.
    ///
    /// Each step blocks the executor until its container has exited and its
    /// logs are drained; there is no concurrent step execution, no per-step
    /// timeout, and no mid-run cancellation hook. On the first failing step
    /// the error propagates immediately: later steps are skipped, not
    /// attempted, and nothing that earlier steps did is rolled back.
    ///
    /// A schedule attached to the deployment is ignored with a warning and
    /// the run executes immediately; declared step resources are likewise
    /// warned about and ignored. Both warnings are part of the observable
    /// contract of this backend.
    ///
    /// # Errors
    ///
    /// - `OrchestratorError::Config` if the stack has no image builder.
    /// - `OrchestratorError::Settings` if a step's run-args payload is
    ///   malformed (raised before that step's container is launched).
    /// - `OrchestratorError::Run` if a step's container fails; carries the
    ///   captured stderr.
    pub async fn run(
        &self,
        deployment: &Deployment,
        stack: &Stack,
    ) -> Result<RunReport, OrchestratorError> {
        stack.ensure_image_builder()?;

        if deployment.schedule.is_some() {
            tracing::warn!(
                pipeline = %deployment.pipeline_name,
                "Local Docker deployments do not support schedules; the schedule is ignored \
                 and the run starts immediately"
            );
        }

        let run_id = RunId::new();
        let environment = RunEnvironment::build(
            &self.config.local_stores_path,
            run_id,
            &self.config.base_environment,
        )?;

        tracing::info!(
            pipeline = %deployment.pipeline_name,
            run_id = %run_id,
            steps = deployment.steps.len(),
            "Starting deployment run"
        );

        let started = Instant::now();
        let mut steps = Vec::with_capacity(deployment.steps.len());

        for (index, (step_name, step_config)) in deployment.steps.iter().enumerate() {
            self.set_state(ExecutorState::Running(index));

            if !step_config.resources.is_empty() {
                tracing::warn!(
                    step = %step_name,
                    "Step resource settings have no effect on the local Docker backend; \
                     ignoring them"
                );
            }

            let spec = match StepExecutionSpec::build(step_name, step_config, deployment.id) {
                Ok(spec) => spec,
                Err(err) => {
                    self.set_state(ExecutorState::Failed(index));
                    return Err(err.into());
                }
            };

            tracing::info!(step = %step_name, image = %spec.image, "Running step in Docker");

            match self.runner.run(&spec, &environment).await {
                Ok(result) => {
                    steps.push(StepReport {
                        step_name: step_name.clone(),
                        exit_code: result.exit_code,
                        duration: result.duration,
                        log_lines: result.log_lines,
                    });
                }
                Err(err) => {
                    self.set_state(ExecutorState::Failed(index));
                    return Err(err.into());
                }
            }
        }

        self.set_state(ExecutorState::Completed);
        let duration = started.elapsed();

        tracing::info!(
            run_id = %run_id,
            "Deployment run finished in {}",
            human_duration(duration)
        );

        Ok(RunReport {
            run_id,
            duration,
            steps,
        })
    }
}

/// Renders a duration as `1h 2m 3s` / `2m 3s` / `3.4s`.
fn human_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
