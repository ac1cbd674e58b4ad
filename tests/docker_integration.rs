//! Integration tests against a real local Docker daemon.
//!
//! These tests create real containers.
//! Run with: cargo test --test docker_integration -- --ignored

use std::sync::{Arc, Mutex};

use dockstep::execution::{ContainerRunRequest, ContainerRuntime, DockerClient, LogStreamKind};
use serde_json::Map;

fn create_client() -> DockerClient {
    DockerClient::new().expect("Docker daemon must be available for integration tests")
}

fn request(name: &str, command: &[&str]) -> ContainerRunRequest {
    ContainerRunRequest {
        container_name: format!("dockstep-it-{name}"),
        image: "alpine:3.19".to_string(),
        entrypoint: vec!["/bin/sh".to_string(), "-c".to_string()],
        command: command.iter().map(|s| s.to_string()).collect(),
        env: vec!["DOCKSTEP_ORCHESTRATOR_RUN_ID=integration".to_string()],
        binds: Vec::new(),
        user: None,
        extra_hosts: vec!["host.docker.internal:host-gateway".to_string()],
        run_args: Map::new(),
    }
}

#[tokio::test]
#[ignore] // Run with: cargo test --test docker_integration -- --ignored
async fn test_echo_round_trip() {
    let client = create_client();
    let lines = Arc::new(Mutex::new(Vec::new()));

    let sink = lines.clone();
    let exit = client
        .run_to_completion(
            request("echo", &["echo from-container"]),
            &mut move |line| {
                sink.lock().expect("lock").push(line);
            },
        )
        .await
        .expect("container should run");

    assert_eq!(exit.status_code, 0);

    let lines = lines.lock().expect("lock");
    assert!(lines
        .iter()
        .any(|line| line.content.contains("from-container")));
}

#[tokio::test]
#[ignore]
async fn test_nonzero_exit_and_stderr_stream() {
    let client = create_client();
    let lines = Arc::new(Mutex::new(Vec::new()));

    let sink = lines.clone();
    let exit = client
        .run_to_completion(
            request("fail", &["echo boom >&2; exit 7"]),
            &mut move |line| {
                sink.lock().expect("lock").push(line);
            },
        )
        .await
        .expect("wait should still resolve the exit code");

    assert_eq!(exit.status_code, 7);

    let lines = lines.lock().expect("lock");
    assert!(lines
        .iter()
        .any(|line| line.stream == LogStreamKind::Stderr && line.content.contains("boom")));
}
