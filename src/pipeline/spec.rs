//! Resolved, ready-to-run description of one pipeline step.
//!
//! A `StepExecutionSpec` is built fresh per step and discarded after the
//! step's container exits. Construction is deterministic: the entrypoint is
//! fixed and the argument vector depends on the step name and deployment id
//! only, so the same inputs always reconstruct the same command.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SettingsError;
use crate::pipeline::deployment::StepConfig;

/// The framework-defined step entrypoint, expected on `PATH` inside every
/// step image.
pub const STEP_ENTRYPOINT: &[&str] = &["dockstep-step-entrypoint"];

/// A resolved step, ready to hand to the container runner.
#[derive(Debug, Clone, PartialEq)]
pub struct StepExecutionSpec {
    pub step_name: String,
    /// Resolved container image reference.
    pub image: String,
    /// Entrypoint process vector (fixed, framework-defined).
    pub entrypoint: Vec<String>,
    /// Command arguments passed to the entrypoint.
    pub arguments: Vec<String>,
    /// Extra low-level container-runtime options (the user escape hatch).
    pub run_args: Map<String, Value>,
    /// Numeric uid to run the container process as; `None` on Windows hosts.
    pub user: Option<u32>,
}

impl StepExecutionSpec {
    /// Builds the execution spec for one step of a deployment.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the step's raw settings payload does not
    /// resolve to a run-args mapping (see [`resolve_run_args`]). Raised
    /// eagerly, before any container launch for the step.
    pub fn build(
        step_name: &str,
        config: &StepConfig,
        deployment_id: Uuid,
    ) -> Result<Self, SettingsError> {
        let run_args = resolve_run_args(config.settings.as_ref())?;

        Ok(Self {
            step_name: step_name.to_string(),
            image: config.image.clone(),
            entrypoint: entrypoint_command(),
            arguments: entrypoint_arguments(step_name, deployment_id),
            run_args,
            user: current_user_id(),
        })
    }
}

/// The fixed entrypoint command vector.
pub fn entrypoint_command() -> Vec<String> {
    STEP_ENTRYPOINT.iter().map(|part| part.to_string()).collect()
}

/// Entrypoint arguments for one step.
///
/// A deterministic function of the step name and deployment id only; no
/// other input affects the result.
pub fn entrypoint_arguments(step_name: &str, deployment_id: Uuid) -> Vec<String> {
    vec![
        "--deployment-id".to_string(),
        deployment_id.to_string(),
        "--step-name".to_string(),
        step_name.to_string(),
    ]
}

/// Resolves a raw settings payload into a run-args mapping.
///
/// Total over its documented input domain:
/// - absent / JSON null → empty map
/// - JSON object → returned unchanged
/// - JSON string → parsed as JSON; must decode to an object
/// - anything else (number, array, boolean) → [`SettingsError::UnsupportedType`]
pub fn resolve_run_args(raw: Option<&Value>) -> Result<Map<String, Value>, SettingsError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(encoded)) => {
            let decoded: Value = serde_json::from_str(encoded)
                .map_err(|err| SettingsError::InvalidJson(err.to_string()))?;
            match decoded {
                Value::Object(map) => Ok(map),
                other => Err(SettingsError::NotAMapping(value_type_name(&other).to_string())),
            }
        }
        Some(other) => Err(SettingsError::UnsupportedType(
            value_type_name(other).to_string(),
        )),
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Numeric uid of the invoking process on Unix hosts, so the container
/// process writes bind-mounted output as that user instead of root. Unset on
/// Windows hosts.
fn current_user_id() -> Option<u32> {
    #[cfg(unix)]
    {
        // SAFETY: getuid has no failure modes and touches no memory.
        Some(unsafe { libc::getuid() })
    }
    #[cfg(not(unix))]
    {
        None
    }
}
