//! Docker runtime implementation using the bollard crate.
//!
//! Implements the [`ContainerRuntime`](crate::execution::runner::ContainerRuntime)
//! contract against a local Docker daemon: pull the image when absent, create
//! and start the container, follow its log stream to the end, then resolve
//! the exit code.

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use serde_json::{Map, Value};

use async_trait::async_trait;

use crate::error::DockerError;
use crate::execution::runner::{
    ContainerExit, ContainerRunRequest, ContainerRuntime, LogLine, LogStreamKind,
};

/// Docker client wrapper for step container execution.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not
    /// accessible.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Checks if an image exists locally.
    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    /// Pulls an image from a registry.
    pub async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| DockerError::PullFailed {
                image: image.to_string(),
                message: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Translates a run request into a container configuration.
    ///
    /// When the request carries extra run args, the typed configuration is
    /// serialized, the run args are merged in last-writer-wins (object values
    /// merge recursively, everything else replaces), and the result is
    /// decoded back. Run-arg keys are Docker Engine API container-create
    /// fields (e.g. `Env`, `User`, `HostConfig`); overriding any field set by
    /// the engine is intentional.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::InvalidRunArgs` if the merged value no longer
    /// decodes as a container configuration. Raised before the container is
    /// created.
    fn build_config(request: &ContainerRunRequest) -> Result<Config<String>, DockerError> {
        let host_config = HostConfig {
            binds: if request.binds.is_empty() {
                None
            } else {
                Some(request.binds.clone())
            },
            extra_hosts: if request.extra_hosts.is_empty() {
                None
            } else {
                Some(request.extra_hosts.clone())
            },
            ..Default::default()
        };

        let config = Config {
            image: Some(request.image.clone()),
            entrypoint: Some(request.entrypoint.clone()),
            cmd: Some(request.command.clone()),
            env: if request.env.is_empty() {
                None
            } else {
                Some(request.env.clone())
            },
            user: request.user.clone(),
            host_config: Some(host_config),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        if request.run_args.is_empty() {
            return Ok(config);
        }

        let mut merged = serde_json::to_value(&config)
            .map_err(|e| DockerError::InvalidRunArgs(e.to_string()))?;
        merge_value(&mut merged, &Value::Object(request.run_args.clone()));

        serde_json::from_value(merged).map_err(|e| DockerError::InvalidRunArgs(e.to_string()))
    }

    /// Resolves the exit code of a stopped container via inspection.
    async fn inspect_exit_code(&self, id: &str) -> Result<i64, DockerError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| DockerError::WaitFailed(format!("Failed to inspect container: {e}")))?;

        let state = info
            .state
            .ok_or_else(|| DockerError::WaitFailed("Container has no state".to_string()))?;

        state
            .exit_code
            .ok_or_else(|| DockerError::WaitFailed("Container has no exit code".to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    /// Runs a step container to completion.
    ///
    /// Does not return until the container has exited and the log stream has
    /// been read to its end; with `follow` set, the Docker API closes the
    /// stream only once the container stops, so draining it here is what
    /// guarantees no partial-log loss.
    ///
    /// The exited container is left in place for post-mortem inspection.
    async fn run_to_completion(
        &self,
        request: ContainerRunRequest,
        on_line: &mut (dyn FnMut(LogLine) + Send),
    ) -> Result<ContainerExit, DockerError> {
        if !self.image_exists(&request.image).await {
            tracing::info!(image = %request.image, "Image not present locally, pulling");
            self.pull_image(&request.image).await?;
        }

        let config = Self::build_config(&request)?;

        let options = CreateContainerOptions {
            name: request.container_name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| DockerError::CreateFailed(e.to_string()))?;
        let id = created.id;

        self.docker
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::StartFailed(e.to_string()))?;

        let log_options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(&id, Some(log_options));

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    for content in split_lines(&message) {
                        on_line(LogLine {
                            stream: LogStreamKind::Stdout,
                            content,
                        });
                    }
                }
                Ok(LogOutput::StdErr { message }) => {
                    for content in split_lines(&message) {
                        on_line(LogLine {
                            stream: LogStreamKind::Stderr,
                            content,
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(DockerError::LogStreamFailed(e.to_string()));
                }
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut wait = self.docker.wait_container(&id, Some(wait_options));

        let status_code = match wait.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard reports a non-zero container exit as an error variant
            // carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(_)) | None => self.inspect_exit_code(&id).await?,
        };

        Ok(ContainerExit { status_code })
    }
}

/// Splits a raw log chunk into trailing-newline-free lines.
fn split_lines(message: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(message)
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

/// Recursive last-writer-wins merge: objects merge key-by-key, any other
/// overlay value replaces the base value.
fn merge_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => {
            *slot = value.clone();
        }
    }
}

/// Builds a run-args map from key/value pairs (test and caller convenience).
pub fn run_args_from_pairs<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ContainerRunRequest {
        ContainerRunRequest {
            container_name: "dockstep-test-train".to_string(),
            image: "pipeline/train:1.0".to_string(),
            entrypoint: vec!["dockstep-step-entrypoint".to_string()],
            command: vec![
                "--deployment-id".to_string(),
                "4f9bcae2-7a67-4e2a-9ab2-7a2f2f4a1f00".to_string(),
                "--step-name".to_string(),
                "train".to_string(),
            ],
            env: vec!["DOCKSTEP_ORCHESTRATOR_RUN_ID=abc".to_string()],
            binds: vec!["/tmp/stores:/tmp/stores:rw".to_string()],
            user: Some("1000".to_string()),
            extra_hosts: vec!["host.docker.internal:host-gateway".to_string()],
            run_args: Map::new(),
        }
    }

    #[test]
    fn test_build_config_basic_fields() {
        let config = DockerClient::build_config(&request()).expect("config should build");

        assert_eq!(config.image.as_deref(), Some("pipeline/train:1.0"));
        assert_eq!(config.user.as_deref(), Some("1000"));
        assert_eq!(
            config.entrypoint,
            Some(vec!["dockstep-step-entrypoint".to_string()])
        );

        let host_config = config.host_config.expect("host config should be set");
        assert_eq!(
            host_config.binds,
            Some(vec!["/tmp/stores:/tmp/stores:rw".to_string()])
        );
        assert_eq!(
            host_config.extra_hosts,
            Some(vec!["host.docker.internal:host-gateway".to_string()])
        );
    }

    #[test]
    fn test_run_args_override_wins() {
        let mut req = request();
        req.run_args = run_args_from_pairs([
            ("User", json!("0")),
            ("HostConfig", json!({"Privileged": true})),
        ]);

        let config = DockerClient::build_config(&req).expect("config should build");

        // Last writer wins: the override replaces the engine-set user.
        assert_eq!(config.user.as_deref(), Some("0"));

        // Objects merge recursively: privileged is added, binds survive.
        let host_config = config.host_config.expect("host config should be set");
        assert_eq!(host_config.privileged, Some(true));
        assert_eq!(
            host_config.binds,
            Some(vec!["/tmp/stores:/tmp/stores:rw".to_string()])
        );
    }

    #[test]
    fn test_invalid_run_args_rejected_before_launch() {
        let mut req = request();
        req.run_args = run_args_from_pairs([("Env", json!(42))]);

        let result = DockerClient::build_config(&req);
        assert!(matches!(result, Err(DockerError::InvalidRunArgs(_))));
    }

    #[test]
    fn test_merge_value_scalar_replacement() {
        let mut base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_value(&mut base, &json!({"a": 9, "b": {"c": 8}, "e": 7}));

        assert_eq!(base, json!({"a": 9, "b": {"c": 8, "d": 3}, "e": 7}));
    }

    #[test]
    fn test_split_lines_strips_terminators() {
        let lines = split_lines(b"one\r\ntwo\nthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);

        assert!(split_lines(b"\n").is_empty());
    }
}
