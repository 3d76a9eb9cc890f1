//! Integration tests for the permission engine: classifier dispatch, YOLO,
//! preferences, prompt deduplication and the audit log.

mod init_logging;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use qwen_tui_core::{
    DecisionHandler, PermissionAction, PermissionEngine, PermissionRequest, PermissionVerdict,
    PreferenceChoice, PromptDecision, RiskLevel,
};
use serde_json::json;

fn engine(dir: &std::path::Path) -> PermissionEngine {
    PermissionEngine::with_preferences_path(dir, None)
}

/// **Scenario**: `"sudo rm -rf /"` -> (critical, block); `"ls -la"` ->
/// (safe, allow); `"curl https://x"` -> (medium, prompt).
#[tokio::test]
async fn command_classifier_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let critical = engine.assess("Bash", &json!({"command": "sudo rm -rf /"}));
    assert_eq!(critical.risk_level, RiskLevel::Critical);
    assert_eq!(critical.action, PermissionAction::Block);

    let safe = engine.assess("Bash", &json!({"command": "ls -la"}));
    assert_eq!(safe.risk_level, RiskLevel::Safe);
    assert_eq!(safe.action, PermissionAction::Allow);

    let network = engine.assess("Bash", &json!({"command": "curl https://x"}));
    assert_eq!(network.risk_level, RiskLevel::Medium);
    assert_eq!(network.action, PermissionAction::Prompt);
}

#[tokio::test]
async fn coordinator_dispatches_by_tool_name() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let search = engine.assess("Grep", &json!({"pattern": "x"}));
    assert_eq!(search.action, PermissionAction::Allow);

    let task = engine.assess("Task", &json!({"description": "d", "prompt": "p"}));
    assert_eq!((task.risk_level, task.action), (RiskLevel::Low, PermissionAction::Allow));

    let unknown = engine.assess("Teleport", &json!({}));
    assert_eq!(
        (unknown.risk_level, unknown.action),
        (RiskLevel::Medium, PermissionAction::Prompt)
    );

    let write = engine.assess("Write", &json!({"file_path": "/etc/passwd", "content": ""}));
    assert_eq!(write.action, PermissionAction::Block);
}

#[tokio::test]
async fn yolo_mode_bypasses_even_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    engine.set_yolo_mode(true);

    let verdict = engine.check("Bash", &json!({"command": "sudo rm -rf /"})).await;
    assert_eq!(verdict, PermissionVerdict::Allowed);

    let audit = engine.audit_log();
    assert!(audit.last().unwrap().outcome.contains("yolo"));
}

#[tokio::test]
async fn block_without_prompt_surfaces_reasons() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let verdict = engine.check("Bash", &json!({"command": "rm -rf /"})).await;
    match verdict {
        PermissionVerdict::Denied { reason } => {
            assert!(reason.contains("Critical operation"));
        }
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn prompt_without_handler_fails_safe() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let verdict = engine.check("Bash", &json!({"command": "curl https://x"})).await;
    assert!(matches!(verdict, PermissionVerdict::Denied { .. }));
}

struct CountingHandler {
    prompts: AtomicUsize,
    decision: PromptDecision,
}

#[async_trait]
impl DecisionHandler for CountingHandler {
    async fn decide(&self, _request: PermissionRequest) -> PromptDecision {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        // Hold the decision open briefly so concurrent duplicates can join.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.decision
    }
}

/// **Scenario**: two concurrent `Bash(command="rm -rf ./tmp")` calls raise
/// exactly one prompt and both resolve with the same decision.
#[tokio::test]
async fn duplicate_concurrent_prompts_share_one_decision() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine(dir.path()));
    let handler = Arc::new(CountingHandler {
        prompts: AtomicUsize::new(0),
        decision: PromptDecision::AllowOnce,
    });
    engine.set_decision_handler(handler.clone());

    let args = json!({"command": "rm -rf ./tmp"});
    let (a, b) = tokio::join!(
        engine.check("Bash", &args),
        engine.check("Bash", &args),
    );

    assert_eq!(handler.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(a, PermissionVerdict::Allowed);
    assert_eq!(a, b);
}

#[tokio::test]
async fn always_deny_decision_persists_as_preference() {
    let dir = tempfile::tempdir().unwrap();
    let prefs_path = dir.path().join("prefs.json");
    let engine = PermissionEngine::with_preferences_path(dir.path(), Some(prefs_path.clone()));
    let handler = Arc::new(CountingHandler {
        prompts: AtomicUsize::new(0),
        decision: PromptDecision::AlwaysDeny,
    });
    engine.set_decision_handler(handler.clone());

    let args = json!({"command": "curl https://example.com"});
    let first = engine.check("Bash", &args).await;
    assert!(matches!(first, PermissionVerdict::Denied { .. }));

    // Preference short-circuits: no second prompt.
    let second = engine.check("Bash", &args).await;
    assert!(matches!(second, PermissionVerdict::Denied { .. }));
    assert_eq!(handler.prompts.load(Ordering::SeqCst), 1);

    // And it survives a restart from the same preferences file.
    let reloaded = PermissionEngine::with_preferences_path(dir.path(), Some(prefs_path));
    assert_eq!(reloaded.preference("Bash"), Some(PreferenceChoice::AlwaysDeny));
}

#[tokio::test]
async fn preference_allow_skips_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    engine.set_preference("Bash", PreferenceChoice::AlwaysAllow);

    // Would otherwise prompt (network command, no handler installed).
    let verdict = engine.check("Bash", &json!({"command": "curl https://x"})).await;
    assert_eq!(verdict, PermissionVerdict::Allowed);
}

#[tokio::test]
async fn every_decision_lands_in_the_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    engine.check("LS", &json!({})).await;
    engine.check("Bash", &json!({"command": "rm -rf /"})).await;

    let audit = engine.audit_log();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].tool_name, "LS");
    assert_eq!(audit[1].tool_name, "Bash");
    assert!(engine.summary().contains("Recent Permission Decisions"));
}
