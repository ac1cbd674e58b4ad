//! Pipeline-side model and the sequential run loop.
//!
//! A compiled [`deployment::Deployment`] enters
//! [`orchestrator::SequentialStepExecutor::run`]; for each step the executor
//! builds a [`spec::StepExecutionSpec`], merges it with the per-run
//! [`environment::RunEnvironment`], and hands it to the container runner.

pub mod deployment;
pub mod environment;
pub mod orchestrator;
pub mod spec;

pub use deployment::{Deployment, ResourceSettings, Schedule, StepConfig};
pub use environment::{RunEnvironment, RunId, ENV_LOCAL_STORES_PATH, ENV_RUN_ID};
pub use orchestrator::{ExecutorState, RunReport, SequentialStepExecutor, StepReport};
pub use spec::{resolve_run_args, StepExecutionSpec, STEP_ENTRYPOINT};
