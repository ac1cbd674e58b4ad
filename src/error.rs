//! Error types for dockstep operations.
//!
//! Defines error types for the major subsystems:
//! - Orchestrator and stack configuration
//! - Per-step run-argument settings
//! - Docker container management
//! - Step execution and run-level failures

use thiserror::Error;

/// Errors that can occur while assembling or validating configuration.
///
/// Configuration errors are always fatal and always raised before any
/// container is launched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Local stores path must not be empty")]
    EmptyLocalStoresPath,

    #[error("Stack has no image builder component; one is required to run containerized steps")]
    MissingImageBuilder,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while resolving a step's extra run arguments.
///
/// `InvalidJson` and `NotAMapping` are configuration errors (the payload was
/// meant to be a mapping but isn't one); `UnsupportedType` is a type error
/// (the payload is outside the documented input domain entirely).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid JSON string in run args: {0}")]
    InvalidJson(String),

    #[error("Decoded run args value is not a mapping, got {0}")]
    NotAMapping(String),

    #[error("Run args must be a mapping, a JSON-encoded string, or absent; got {0}")]
    UnsupportedType(String),
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Failed to pull image '{image}': {message}")]
    PullFailed { image: String, message: String },

    #[error("Failed to create container: {0}")]
    CreateFailed(String),

    #[error("Failed to start container: {0}")]
    StartFailed(String),

    #[error("Error reading container logs: {0}")]
    LogStreamFailed(String),

    #[error("Error waiting for container exit: {0}")]
    WaitFailed(String),

    #[error("Extra run args do not form a valid container configuration: {0}")]
    InvalidRunArgs(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while running a single step's container.
#[derive(Debug, Error)]
pub enum RunError {
    /// The step's container exited with a non-zero code. Carries the
    /// container's captured stderr verbatim. Not retried at this layer.
    #[error("Step '{step_name}' exited with code {exit_code}: {stderr}")]
    StepFailed {
        step_name: String,
        exit_code: i64,
        stderr: String,
    },

    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),
}

/// Top-level error union surfaced by the sequential executor.
///
/// Every error from spec construction or container execution propagates
/// through unchanged; nothing is caught and suppressed in the run loop.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Execution error: {0}")]
    Run(#[from] RunError),
}
