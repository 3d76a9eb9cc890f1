//! Integration tests for the Bash tool: output capture, stderr section,
//! non-zero exit, env overrides and timeout reaping.

mod init_logging;

use std::path::Path;
use std::time::Instant;

use qwen_tui_core::{register_default_tools, ToolRegistry, ToolStatus};
use serde_json::json;

fn registry_at(dir: &Path) -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_default_tools(&registry, dir).unwrap();
    registry
}

#[tokio::test]
async fn bash_captures_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute("Bash", json!({"command": "printf hello"}))
        .await;
    assert!(result.is_success());
    assert_eq!(result.result.unwrap().as_str().unwrap(), "hello");
    assert_eq!(result.metadata["exit_code"], json!(0));
}

#[tokio::test]
async fn bash_appends_stderr_under_header() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute("Bash", json!({"command": "printf out; printf err >&2"}))
        .await;
    assert!(result.is_success());
    let text = result.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.starts_with("out"));
    assert!(text.contains("STDERR:\nerr"));
}

#[tokio::test]
async fn bash_nonzero_exit_is_an_error_result() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_at(dir.path());

    let result = registry.execute("Bash", json!({"command": "exit 3"})).await;
    assert_eq!(result.status, ToolStatus::Error);
    assert!(result.error.unwrap().contains("exit code 3"));
}

#[tokio::test]
async fn bash_runs_in_the_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute("Bash", json!({"command": "cat marker.txt"}))
        .await;
    assert_eq!(result.result.unwrap().as_str().unwrap(), "here");
}

#[tokio::test]
async fn bash_env_overrides_reach_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute(
            "Bash",
            json!({"command": "printf \"$MY_TEST_VAR\"", "env": {"MY_TEST_VAR": "injected"}}),
        )
        .await;
    assert_eq!(result.result.unwrap().as_str().unwrap(), "injected");
}

/// **Boundary**: a 0.1 s timeout on `sleep 10` errors quickly and the child is
/// reaped rather than left running for ten seconds.
#[tokio::test]
async fn bash_timeout_kills_and_reaps_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_at(dir.path());

    let started = Instant::now();
    let result = registry
        .execute("Bash", json!({"command": "sleep 10", "timeout": 0.1}))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, ToolStatus::Error);
    assert!(result.error.unwrap().contains("timed out"));
    assert!(elapsed.as_secs() < 5, "timeout took {:?}", elapsed);
}
