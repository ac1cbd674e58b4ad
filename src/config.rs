//! Orchestrator configuration and stack requirements.
//!
//! Provides the orchestrator-level configuration (local stores path shared
//! into every step container) and the minimal stack descriptor consumed from
//! the surrounding framework.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::pipeline::environment::ENV_LOCAL_STORES_PATH;

/// Configuration for the sequential step executor.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Host path of the local artifact store, bind-mounted read-write into
    /// every step container. Must be reachable from both the host and the
    /// container runtime; reachability itself is checked by the external
    /// stack validator.
    pub local_stores_path: PathBuf,

    /// Environment variables shared into every step container, in addition
    /// to the run-scoped variables injected by the executor.
    pub base_environment: BTreeMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            local_stores_path: PathBuf::from("./local_stores"),
            base_environment: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DOCKSTEP_LOCAL_STORES_PATH`: local stores path (default: ./local_stores)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(ENV_LOCAL_STORES_PATH) {
            config.local_stores_path = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyLocalStoresPath` if the local stores path
    /// is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_stores_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyLocalStoresPath);
        }

        Ok(())
    }

    /// Builder method to set the local stores path.
    pub fn with_local_stores_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_stores_path = path.into();
        self
    }

    /// Builder method to set a base environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_environment.insert(key.into(), value.into());
        self
    }
}

/// Minimal descriptor of the stack this orchestrator runs in.
///
/// Only the components whose presence this backend must check are modeled;
/// the full stack lives in the surrounding framework.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    /// Name of the registered image builder component, if any.
    pub image_builder: Option<String>,
    /// Name of the registered container registry component, if any.
    pub container_registry: Option<String>,
}

impl Stack {
    /// Creates a stack with an image builder registered.
    pub fn with_image_builder(name: impl Into<String>) -> Self {
        Self {
            image_builder: Some(name.into()),
            container_registry: None,
        }
    }

    /// Builder method to set the container registry.
    pub fn with_container_registry(mut self, name: impl Into<String>) -> Self {
        self.container_registry = Some(name.into());
        self
    }

    /// Checks the hard precondition for running containerized steps.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingImageBuilder` if no image builder
    /// component is registered. This is a configuration error, not a runtime
    /// error, and is raised before any container work begins.
    pub fn ensure_image_builder(&self) -> Result<(), ConfigError> {
        if self.image_builder.is_none() {
            return Err(ConfigError::MissingImageBuilder);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.local_stores_path, PathBuf::from("./local_stores"));
        assert!(config.base_environment.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_local_stores_path_rejected() {
        let config = OrchestratorConfig::default().with_local_stores_path("");
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::EmptyLocalStoresPath)));
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::new()
            .with_local_stores_path("/var/lib/dockstep/stores")
            .with_env_var("PIPELINE_ENV", "dev");

        assert_eq!(
            config.local_stores_path,
            PathBuf::from("/var/lib/dockstep/stores")
        );
        assert_eq!(
            config.base_environment.get("PIPELINE_ENV"),
            Some(&"dev".to_string())
        );
    }

    #[test]
    fn test_stack_requires_image_builder() {
        let stack = Stack::default();
        assert!(matches!(
            stack.ensure_image_builder(),
            Err(ConfigError::MissingImageBuilder)
        ));

        let stack = Stack::with_image_builder("local-builder");
        assert!(stack.ensure_image_builder().is_ok());
    }

    #[test]
    fn test_stack_builder() {
        let stack = Stack::with_image_builder("local-builder").with_container_registry("localhost:5000");
        assert_eq!(stack.image_builder.as_deref(), Some("local-builder"));
        assert_eq!(stack.container_registry.as_deref(), Some("localhost:5000"));
    }
}
