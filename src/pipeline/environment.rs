//! Run identity and the per-run shared container environment.
//!
//! One `RunId` and one `RunEnvironment` are created at the start of each run
//! and shared read-only across every step invocation. The environment is
//! explicit state passed by reference into each step, never process-global
//! mutation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use uuid::Uuid;

use crate::error::ConfigError;

/// Environment variable carrying the run correlation id into step containers.
pub const ENV_RUN_ID: &str = "DOCKSTEP_ORCHESTRATOR_RUN_ID";

/// Environment variable carrying the local stores path into step containers.
pub const ENV_LOCAL_STORES_PATH: &str = "DOCKSTEP_LOCAL_STORES_PATH";

/// Process-unique identifier for one end-to-end deployment run.
///
/// Generated once at run start, held for the run's duration, never persisted
/// by this layer; the external run-metadata store resolves it to a run record
/// after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh run id. Pure generation, no error conditions.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    ReadWrite,
    ReadOnly,
}

impl MountMode {
    /// The mode suffix understood by the container runtime.
    pub fn as_str(&self) -> &'static str {
        match self {
            MountMode::ReadWrite => "rw",
            MountMode::ReadOnly => "ro",
        }
    }
}

/// Target of a bind mount inside a step container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Path inside the container.
    pub bind: String,
    pub mode: MountMode,
}

/// Environment variables and bind mounts shared by every step of one run.
///
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct RunEnvironment {
    run_id: RunId,
    env_vars: BTreeMap<String, String>,
    mounts: BTreeMap<String, MountSpec>,
}

impl RunEnvironment {
    /// Builds the shared environment for one run.
    ///
    /// The env-var map is `base_env` plus the run id and local stores path
    /// variables (the injected variables win on key collision). The mount map
    /// bind-mounts the local stores path read-write at the same path inside
    /// the container.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyLocalStoresPath` if `local_stores_path` is
    /// empty. Whether the path is reachable from the container runtime is
    /// checked by the external stack validator, not here.
    pub fn build(
        local_stores_path: &Path,
        run_id: RunId,
        base_env: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        if local_stores_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyLocalStoresPath);
        }

        let stores_path = local_stores_path.to_string_lossy().into_owned();

        let mut env_vars = base_env.clone();
        env_vars.insert(ENV_RUN_ID.to_string(), run_id.to_string());
        env_vars.insert(ENV_LOCAL_STORES_PATH.to_string(), stores_path.clone());

        let mut mounts = BTreeMap::new();
        mounts.insert(
            stores_path.clone(),
            MountSpec {
                bind: stores_path,
                mode: MountMode::ReadWrite,
            },
        );

        Ok(Self {
            run_id,
            env_vars,
            mounts,
        })
    }

    /// The run this environment belongs to.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Environment variables injected into every step container.
    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    /// Bind mounts (host path → mount spec) applied to every step container.
    pub fn mounts(&self) -> &BTreeMap<String, MountSpec> {
        &self.mounts
    }

    /// Environment variables as `KEY=VALUE` strings for the runtime.
    pub fn env_list(&self) -> Vec<String> {
        self.env_vars
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }

    /// Bind mounts as `host:container:mode` strings for the runtime.
    pub fn binds(&self) -> Vec<String> {
        self.mounts
            .iter()
            .map(|(host, spec)| format!("{host}:{}:{}", spec.bind, spec.mode.as_str()))
            .collect()
    }
}
