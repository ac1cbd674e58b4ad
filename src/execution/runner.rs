//! Container runner: one step, one container, run to completion.
//!
//! `ContainerRunner` sits between the executor and the container runtime. It
//! translates a resolved step spec plus the shared run environment into a
//! runtime request, relays the container's output line-by-line as it is
//! produced, and converts a non-zero exit into a typed step failure carrying
//! the captured stderr.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{DockerError, RunError};
use crate::pipeline::environment::RunEnvironment;
use crate::pipeline::spec::StepExecutionSpec;

/// Host alias added to every step container so containerized steps can reach
/// services running on the orchestrating host.
pub const HOST_GATEWAY_ALIAS: &str = "host.docker.internal:host-gateway";

/// Which output stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStreamKind {
    Stdout,
    Stderr,
}

/// One line of container output, delivered as it is produced.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub stream: LogStreamKind,
    pub content: String,
}

/// Everything a container runtime needs to run one step container.
#[derive(Debug, Clone)]
pub struct ContainerRunRequest {
    /// Name to give the container.
    pub container_name: String,
    /// Image reference to run.
    pub image: String,
    /// Entrypoint process vector.
    pub entrypoint: Vec<String>,
    /// Command arguments passed to the entrypoint.
    pub command: Vec<String>,
    /// Environment as `KEY=VALUE` strings.
    pub env: Vec<String>,
    /// Bind mounts as `host:container:mode` strings.
    pub binds: Vec<String>,
    /// User to run as (numeric uid), if set.
    pub user: Option<String>,
    /// Extra host-to-address aliases (`hostname:address`).
    pub extra_hosts: Vec<String>,
    /// Raw extra runtime options, merged last-writer-wins into the runtime's
    /// container configuration. May override anything above; that is the
    /// documented escape hatch.
    pub run_args: Map<String, Value>,
}

/// Exit status reported by the runtime once a container has stopped.
#[derive(Debug, Clone, Copy)]
pub struct ContainerExit {
    pub status_code: i64,
}

/// Minimal contract this engine needs from a container runtime.
///
/// Implementations run one container to completion: create it, start it,
/// deliver each output line through `on_line` as it is produced, and report
/// the exit status once the container has stopped and the log stream is
/// fully drained. The returned future MUST NOT resolve before both of those
/// have happened; callers rely on that for sequential ordering.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run_to_completion(
        &self,
        request: ContainerRunRequest,
        on_line: &mut (dyn FnMut(LogLine) + Send),
    ) -> Result<ContainerExit, DockerError>;
}

/// Outcome of one successfully-exited step container.
///
/// Produced by `ContainerRunner`, consumed immediately by the executor; not
/// retained.
#[derive(Debug, Clone)]
pub struct ContainerExecutionResult {
    pub exit_code: i64,
    /// Number of log lines relayed while the container ran.
    pub log_lines: u64,
    /// Wall-clock time from container launch to fully-drained exit.
    pub duration: Duration,
}

/// Runs one step container at a time against a container runtime.
pub struct ContainerRunner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Launches the step's container and blocks until it exits.
    ///
    /// The returned future does not resolve until the container has exited
    /// and its log stream is fully drained; the caller is occupied for the
    /// container's entire lifetime. Output is relayed line-by-line at info
    /// level as it is produced, not buffered until completion.
    ///
    /// # Errors
    ///
    /// Returns `RunError::StepFailed` (carrying the container's stderr
    /// verbatim) on a non-zero exit, or `RunError::Docker` if the runtime
    /// itself fails. Neither is retried here.
    pub async fn run(
        &self,
        spec: &StepExecutionSpec,
        env: &RunEnvironment,
    ) -> Result<ContainerExecutionResult, RunError> {
        let request = ContainerRunRequest {
            container_name: container_name(spec, env),
            image: spec.image.clone(),
            entrypoint: spec.entrypoint.clone(),
            command: spec.arguments.clone(),
            env: env.env_list(),
            binds: env.binds(),
            user: spec.user.map(|uid| uid.to_string()),
            extra_hosts: vec![HOST_GATEWAY_ALIAS.to_string()],
            run_args: spec.run_args.clone(),
        };

        let started = Instant::now();
        let step_name = spec.step_name.clone();
        let mut log_lines: u64 = 0;
        let mut stderr = String::new();

        let exit = self
            .runtime
            .run_to_completion(request, &mut |line: LogLine| {
                log_lines += 1;
                let content = line.content.trim_end();
                tracing::info!(step = %step_name, "{content}");
                if line.stream == LogStreamKind::Stderr {
                    stderr.push_str(content);
                    stderr.push('\n');
                }
            })
            .await?;

        let duration = started.elapsed();

        if exit.status_code != 0 {
            return Err(RunError::StepFailed {
                step_name: spec.step_name.clone(),
                exit_code: exit.status_code,
                stderr,
            });
        }

        Ok(ContainerExecutionResult {
            exit_code: exit.status_code,
            log_lines,
            duration,
        })
    }
}

/// Container name unique within a run: run id prefix plus step name.
fn container_name(spec: &StepExecutionSpec, env: &RunEnvironment) -> String {
    let run_id = env.run_id().as_uuid().simple().to_string();
    let short_id = &run_id[..12.min(run_id.len())];
    let step = spec
        .step_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect::<String>();
    format!("dockstep-{short_id}-{step}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::deployment::StepConfig;
    use crate::pipeline::environment::RunId;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StaticRuntime {
        lines: Vec<LogLine>,
        exit: i64,
        seen: Mutex<Vec<ContainerRunRequest>>,
    }

    #[async_trait]
    impl ContainerRuntime for StaticRuntime {
        async fn run_to_completion(
            &self,
            request: ContainerRunRequest,
            on_line: &mut (dyn FnMut(LogLine) + Send),
        ) -> Result<ContainerExit, DockerError> {
            self.seen.lock().expect("lock").push(request);
            for line in &self.lines {
                on_line(line.clone());
            }
            Ok(ContainerExit {
                status_code: self.exit,
            })
        }
    }

    fn fixture() -> (StepExecutionSpec, RunEnvironment) {
        let config = StepConfig::new("pipeline/train:1.0");
        let spec = StepExecutionSpec::build("train", &config, Uuid::new_v4())
            .expect("spec should build");
        let env = RunEnvironment::build(Path::new("/tmp/stores"), RunId::new(), &BTreeMap::new())
            .expect("env should build");
        (spec, env)
    }

    #[tokio::test]
    async fn test_successful_run_reports_result() {
        let (spec, env) = fixture();
        let runtime = Arc::new(StaticRuntime {
            lines: vec![
                LogLine {
                    stream: LogStreamKind::Stdout,
                    content: "loading data".to_string(),
                },
                LogLine {
                    stream: LogStreamKind::Stdout,
                    content: "done".to_string(),
                },
            ],
            exit: 0,
            seen: Mutex::new(Vec::new()),
        });

        let runner = ContainerRunner::new(runtime.clone());
        let result = runner.run(&spec, &env).await.expect("run should succeed");

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.log_lines, 2);

        let seen = runtime.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].image, "pipeline/train:1.0");
        assert_eq!(seen[0].extra_hosts, vec![HOST_GATEWAY_ALIAS.to_string()]);
        assert!(seen[0].binds.contains(&"/tmp/stores:/tmp/stores:rw".to_string()));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr_verbatim() {
        let (spec, env) = fixture();
        let runtime = Arc::new(StaticRuntime {
            lines: vec![
                LogLine {
                    stream: LogStreamKind::Stdout,
                    content: "starting".to_string(),
                },
                LogLine {
                    stream: LogStreamKind::Stderr,
                    content: "Traceback (most recent call last):".to_string(),
                },
                LogLine {
                    stream: LogStreamKind::Stderr,
                    content: "ValueError: bad input".to_string(),
                },
            ],
            exit: 1,
            seen: Mutex::new(Vec::new()),
        });

        let runner = ContainerRunner::new(runtime);
        let err = runner.run(&spec, &env).await.expect_err("run should fail");

        match err {
            RunError::StepFailed {
                step_name,
                exit_code,
                stderr,
            } => {
                assert_eq!(step_name, "train");
                assert_eq!(exit_code, 1);
                assert!(stderr.contains("Traceback"));
                assert!(stderr.contains("ValueError: bad input"));
                assert!(!stderr.contains("starting"));
            }
            other => panic!("expected StepFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_carries_user_and_run_env() {
        let (spec, env) = fixture();
        let runtime = Arc::new(StaticRuntime {
            lines: Vec::new(),
            exit: 0,
            seen: Mutex::new(Vec::new()),
        });

        let runner = ContainerRunner::new(runtime.clone());
        runner.run(&spec, &env).await.expect("run should succeed");

        let seen = runtime.seen.lock().expect("lock");
        let request = &seen[0];

        if cfg!(unix) {
            assert!(request.user.is_some());
        }
        assert!(request
            .env
            .iter()
            .any(|entry| entry.starts_with("DOCKSTEP_ORCHESTRATOR_RUN_ID=")));
        assert!(request.container_name.starts_with("dockstep-"));
        assert!(request.container_name.ends_with("-train"));
    }
}
