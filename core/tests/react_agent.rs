//! Integration tests for the ReAct agent turn loop: thinking separation,
//! tool-call extraction and execution, history management.

mod init_logging;

use std::sync::Arc;

use futures::StreamExt;
use qwen_tui_core::{
    register_default_tools, AgentEvent, BackendKind, BackendManager, Config, MockBehavior,
    MockDriver, ReActAgent, ToolCall, ToolRegistry, ToolStatus,
};
use serde_json::Map;

struct Harness {
    agent: ReActAgent,
    _dir: tempfile::TempDir,
}

async fn harness(behavior: MockBehavior) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), "hello").unwrap();

    let manager = Arc::new(BackendManager::new(Config::default()));
    manager
        .insert_driver(Arc::new(MockDriver::new(BackendKind::Ollama, behavior)))
        .await;

    let registry = Arc::new(ToolRegistry::new());
    register_default_tools(&registry, dir.path()).unwrap();

    let agent = ReActAgent::new(manager, registry, dir.path());
    Harness { agent, _dir: dir }
}

async fn run_turn(agent: &ReActAgent, message: &str) -> Vec<AgentEvent> {
    let stream = agent.send_message(message);
    futures::pin_mut!(stream);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

fn visible_text(events: &[AgentEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Visible { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// **Invariant**: the visible channel never carries `<think>` content; the
/// reasoning surfaces only as thinking previews.
#[tokio::test]
async fn thinking_never_reaches_the_visible_channel() {
    let h = harness(MockBehavior::StreamTokens(vec![
        "<think>secret plan</think>".to_string(),
        "Here is my answer.".to_string(),
    ]))
    .await;

    let events = run_turn(&h.agent, "What should I do?").await;
    let visible = visible_text(&events);

    assert!(visible.contains("Here is my answer."));
    assert!(!visible.contains("secret plan"));
    assert!(!visible.to_lowercase().contains("<think>"));
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::Thinking { preview } if preview.contains("secret plan"))));
}

/// A bare-form tool call in the model output is extracted and executed, with
/// running and completed progress events in order.
#[tokio::test]
async fn bare_tool_call_is_extracted_and_executed() {
    let h = harness(MockBehavior::StreamTokens(vec![
        "Let me look around. ".to_string(),
        "LS()".to_string(),
    ]))
    .await;

    let events = run_turn(&h.agent, "list the project").await;

    let progress: Vec<(&str, ToolStatus)> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolProgress { tool, status, .. } => Some((tool.as_str(), *status)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0], ("LS", ToolStatus::Running));
    assert_eq!(progress[1].0, "LS");
    assert_eq!(progress[1].1, ToolStatus::Completed);

    let completed = events.iter().find_map(|e| match e {
        AgentEvent::ToolProgress {
            status: ToolStatus::Completed,
            result,
            ..
        } => result.clone(),
        _ => None,
    });
    assert!(completed.unwrap().as_str().unwrap().contains("readme.md"));
}

/// Structured tool calls from the provider take precedence over the text
/// recognizers.
#[tokio::test]
async fn structured_tool_calls_from_provider_are_used() {
    let mut arguments = Map::new();
    arguments.insert("file_path".to_string(), serde_json::json!("readme.md"));
    let h = harness(MockBehavior::StreamThenToolCalls(
        vec!["Reading the readme.".to_string()],
        vec![ToolCall::new("call-1", "Read", arguments)],
    ))
    .await;

    let events = run_turn(&h.agent, "read the readme").await;
    let completed = events.iter().find_map(|e| match e {
        AgentEvent::ToolProgress {
            tool,
            status: ToolStatus::Completed,
            result,
            ..
        } if tool == "Read" => result.clone(),
        _ => None,
    });
    assert!(completed.unwrap().as_str().unwrap().contains("hello"));
}

/// Malformed tool mentions are skipped without failing the turn.
#[tokio::test]
async fn unknown_tool_mentions_are_ignored() {
    let h = harness(MockBehavior::StreamTokens(vec![
        "Calling Frobnicate(x=1) does nothing.".to_string(),
    ]))
    .await;

    let events = run_turn(&h.agent, "go").await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolProgress { .. })));
    assert!(visible_text(&events).contains("Frobnicate"));
}

#[tokio::test]
async fn conversation_history_appends_and_trims() {
    let h = harness(MockBehavior::StreamTokens(vec!["reply".to_string()])).await;

    for i in 0..12 {
        run_turn(&h.agent, &format!("message {}", i)).await;
    }

    let history = h.agent.conversation_history();
    assert_eq!(history.len(), 20);
    // The oldest exchanges were trimmed; the newest survives.
    assert!(history.last().unwrap().content.contains("reply"));
}

#[tokio::test]
async fn clear_and_compact_context() {
    let h = harness(MockBehavior::StreamTokens(vec!["reply".to_string()])).await;

    for i in 0..7 {
        run_turn(&h.agent, &format!("message {}", i)).await;
    }
    assert_eq!(h.agent.conversation_history().len(), 14);

    let summary = h.agent.compact_context();
    assert!(summary.contains("Compacted"));
    assert_eq!(h.agent.conversation_history().len(), 6);

    h.agent.clear_context();
    assert!(h.agent.conversation_history().is_empty());
    assert_eq!(h.agent.action_summary(), "No actions taken yet.");
}

#[tokio::test]
async fn action_summary_records_the_turn() {
    let h = harness(MockBehavior::StreamTokens(vec![
        "<think>deciding</think>LS()".to_string(),
    ]))
    .await;

    run_turn(&h.agent, "explore").await;
    let summary = h.agent.action_summary();
    assert!(summary.contains("[respond]"));
    assert!(summary.contains("[think]"));
    assert!(summary.contains("[tool_use]"));
    assert!(summary.contains("[observe]"));
}

/// Backend failure ends the turn with a user-facing message instead of a
/// dangling stream.
#[tokio::test]
async fn backend_failure_is_surfaced_to_the_caller() {
    let h = harness(MockBehavior::FailOnStart("connection refused".to_string())).await;
    let events = run_turn(&h.agent, "hello").await;
    let visible = visible_text(&events);
    assert!(visible.contains("Tip:"));
}

#[tokio::test]
async fn autonomous_task_collects_visible_output() {
    let h = harness(MockBehavior::StreamTokens(vec![
        "<think>plan</think>".to_string(),
        "Task complete.".to_string(),
    ]))
    .await;

    let output = h.agent.execute_autonomous_task("do something useful").await;
    assert!(output.contains("Task complete."));
    assert!(!output.contains("plan"));
}
