//! Permission engine: coordinates classifiers, preferences, prompts and audit.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{PermissionChecker, PermissionVerdict};

use super::{
    CommandClassifier, FileAccessClassifier, FileOperation, PermissionAction, RiskAssessment,
    RiskLevel,
};

/// Persisted per-tool preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceChoice {
    #[serde(rename = "allow")]
    AlwaysAllow,
    #[serde(rename = "deny")]
    AlwaysDeny,
}

/// What the user picked at a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptDecision {
    AllowOnce,
    DenyOnce,
    AlwaysAllow,
    AlwaysDeny,
}

/// One pending permission request handed to the UI.
#[derive(Clone, Debug)]
pub struct PermissionRequest {
    pub tool_name: String,
    pub parameters: Value,
    pub assessment: RiskAssessment,
}

/// Renders the assessment and returns the user's decision.
///
/// Implemented by the UI layer; the engine suspends the calling agent on the
/// returned future. Duplicate concurrent requests for the same
/// `(tool, frozen-args)` key share a single call into the handler.
#[async_trait]
pub trait DecisionHandler: Send + Sync {
    async fn decide(&self, request: PermissionRequest) -> PromptDecision;
}

/// One audit log entry; every decision is recorded.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub parameters: Value,
    pub risk_level: RiskLevel,
    pub action: PermissionAction,
    pub outcome: String,
}

type SharedDecision = Shared<BoxFuture<'static, PromptDecision>>;

/// Main permission coordinator.
pub struct PermissionEngine {
    command_classifier: CommandClassifier,
    file_classifier: FileAccessClassifier,
    yolo_mode: AtomicBool,
    preferences: Mutex<HashMap<String, PreferenceChoice>>,
    preferences_path: Option<PathBuf>,
    handler: Mutex<Option<Arc<dyn DecisionHandler>>>,
    pending: Mutex<HashMap<String, SharedDecision>>,
    audit_log: Mutex<Vec<AuditEntry>>,
}

impl PermissionEngine {
    /// Engine rooted at `working_directory`, persisting preferences to the
    /// default state path (`~/.local/state/qwen-tui/tool_preferences.json`).
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        let path = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|d| d.join("qwen-tui").join("tool_preferences.json"));
        Self::with_preferences_path(working_directory, path)
    }

    /// Engine with an explicit preferences file (or `None` for in-memory only).
    pub fn with_preferences_path(
        working_directory: impl Into<PathBuf>,
        preferences_path: Option<PathBuf>,
    ) -> Self {
        let preferences = preferences_path
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str::<HashMap<String, PreferenceChoice>>(&s).ok())
            .unwrap_or_default();
        let working_directory = working_directory.into();
        Self {
            command_classifier: CommandClassifier::new(),
            file_classifier: FileAccessClassifier::new(working_directory),
            yolo_mode: AtomicBool::new(false),
            preferences: Mutex::new(preferences),
            preferences_path,
            handler: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            audit_log: Mutex::new(Vec::new()),
        }
    }

    /// Installs the UI decision handler. Without one, prompts resolve to deny.
    pub fn set_decision_handler(&self, handler: Arc<dyn DecisionHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn set_yolo_mode(&self, enabled: bool) {
        if enabled {
            tracing::warn!("YOLO mode enabled, all safety checks bypassed");
        } else {
            tracing::info!("YOLO mode disabled, safety checks re-enabled");
        }
        self.yolo_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn yolo_mode(&self) -> bool {
        self.yolo_mode.load(Ordering::SeqCst)
    }

    /// Sets a persistent per-tool preference.
    pub fn set_preference(&self, tool_name: &str, choice: PreferenceChoice) {
        self.preferences
            .lock()
            .unwrap()
            .insert(tool_name.to_string(), choice);
        self.persist_preferences();
    }

    pub fn preference(&self, tool_name: &str) -> Option<PreferenceChoice> {
        self.preferences.lock().unwrap().get(tool_name).copied()
    }

    pub fn clear_preference(&self, tool_name: &str) {
        self.preferences.lock().unwrap().remove(tool_name);
        self.persist_preferences();
    }

    fn persist_preferences(&self) {
        let Some(path) = &self.preferences_path else {
            return;
        };
        let snapshot = self.preferences.lock().unwrap().clone();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("json.tmp");
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if std::fs::write(&tmp, json)
                    .and_then(|_| std::fs::rename(&tmp, path))
                    .is_err()
                {
                    tracing::warn!(path = %path.display(), "failed to persist tool preferences");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize tool preferences"),
        }
    }

    /// Risk assessment for one tool invocation (coordinator dispatch).
    pub fn assess(&self, tool_name: &str, parameters: &Value) -> RiskAssessment {
        match tool_name {
            "Bash" => {
                let command = parameters
                    .get("command")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                self.command_classifier.classify(command)
            }
            "Write" | "Edit" | "MultiEdit" => {
                let path = parameters
                    .get("file_path")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                self.file_classifier.assess(path, FileOperation::Write)
            }
            "Read" => {
                let path = parameters
                    .get("file_path")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                self.file_classifier.assess(path, FileOperation::Read)
            }
            "Grep" | "Glob" | "LS" => {
                RiskAssessment::new(RiskLevel::Safe, PermissionAction::Allow)
                    .reason("Read-only search operation")
            }
            "Task" => RiskAssessment::new(RiskLevel::Low, PermissionAction::Allow)
                .reason("Task delegation, permissions checked at execution")
                .warning("Subtasks will be subject to their own permission checks"),
            other => RiskAssessment::new(RiskLevel::Medium, PermissionAction::Prompt)
                .reason(format!("Unknown tool: {}", other))
                .warning("Tool not recognized by permission system")
                .suggestion("Verify tool functionality and safety"),
        }
    }

    /// Full decision flow for one request:
    /// YOLO -> preference -> assessment -> prompt (deduplicated).
    pub async fn check(&self, tool_name: &str, parameters: &Value) -> PermissionVerdict {
        if self.yolo_mode() {
            let assessment = RiskAssessment::new(RiskLevel::Safe, PermissionAction::Allow)
                .reason("YOLO mode enabled, all permissions bypassed")
                .warning("Safety checks disabled");
            self.record(tool_name, parameters, &assessment, "allowed (yolo)");
            return PermissionVerdict::Allowed;
        }

        if let Some(choice) = self.preference(tool_name) {
            let assessment = self.assess(tool_name, parameters);
            return match choice {
                PreferenceChoice::AlwaysAllow => {
                    self.record(tool_name, parameters, &assessment, "allowed (preference)");
                    PermissionVerdict::Allowed
                }
                PreferenceChoice::AlwaysDeny => {
                    self.record(tool_name, parameters, &assessment, "denied (preference)");
                    PermissionVerdict::Denied {
                        reason: "denied by saved preference".to_string(),
                    }
                }
            };
        }

        let assessment = self.assess(tool_name, parameters);
        match assessment.action {
            PermissionAction::Allow => {
                self.record(tool_name, parameters, &assessment, "allowed");
                PermissionVerdict::Allowed
            }
            PermissionAction::Block => {
                let reason = assessment.reasons.join("; ");
                self.record(tool_name, parameters, &assessment, "blocked");
                PermissionVerdict::Denied { reason }
            }
            PermissionAction::Prompt => self.prompt(tool_name, parameters, assessment).await,
        }
    }

    async fn prompt(
        &self,
        tool_name: &str,
        parameters: &Value,
        assessment: RiskAssessment,
    ) -> PermissionVerdict {
        let handler = self.handler.lock().unwrap().clone();
        let Some(handler) = handler else {
            self.record(
                tool_name,
                parameters,
                &assessment,
                "denied (no decision handler)",
            );
            return PermissionVerdict::Denied {
                reason: "no decision handler installed".to_string(),
            };
        };

        // Duplicate concurrent requests for the same (tool, args) join one future.
        let key = format!(
            "{}:{}",
            tool_name,
            serde_json::to_string(parameters).unwrap_or_default()
        );
        let future = {
            let mut pending = self.pending.lock().unwrap();
            if let Some(existing) = pending.get(&key) {
                existing.clone()
            } else {
                let request = PermissionRequest {
                    tool_name: tool_name.to_string(),
                    parameters: parameters.clone(),
                    assessment: assessment.clone(),
                };
                let fut: BoxFuture<'static, PromptDecision> =
                    async move { handler.decide(request).await }.boxed();
                let shared = fut.shared();
                pending.insert(key.clone(), shared.clone());
                shared
            }
        };

        let decision = future.await;
        self.pending.lock().unwrap().remove(&key);

        match decision {
            PromptDecision::AllowOnce => {
                self.record(tool_name, parameters, &assessment, "allowed (prompt)");
                PermissionVerdict::Allowed
            }
            PromptDecision::DenyOnce => {
                self.record(tool_name, parameters, &assessment, "denied (prompt)");
                PermissionVerdict::Denied {
                    reason: "denied by user".to_string(),
                }
            }
            PromptDecision::AlwaysAllow => {
                self.set_preference(tool_name, PreferenceChoice::AlwaysAllow);
                self.record(tool_name, parameters, &assessment, "allowed (always)");
                PermissionVerdict::Allowed
            }
            PromptDecision::AlwaysDeny => {
                self.set_preference(tool_name, PreferenceChoice::AlwaysDeny);
                self.record(tool_name, parameters, &assessment, "denied (always)");
                PermissionVerdict::Denied {
                    reason: "denied by user".to_string(),
                }
            }
        }
    }

    fn record(
        &self,
        tool_name: &str,
        parameters: &Value,
        assessment: &RiskAssessment,
        outcome: &str,
    ) {
        tracing::info!(
            tool = tool_name,
            risk = ?assessment.risk_level,
            outcome,
            "permission decision"
        );
        self.audit_log.lock().unwrap().push(AuditEntry {
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            parameters: parameters.clone(),
            risk_level: assessment.risk_level,
            action: assessment.action,
            outcome: outcome.to_string(),
        });
    }

    /// Snapshot of the in-memory audit log.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit_log.lock().unwrap().clone()
    }

    /// Markdown summary of the last ten decisions.
    pub fn summary(&self) -> String {
        let log = self.audit_log.lock().unwrap();
        if log.is_empty() {
            return "No permission decisions recorded.".to_string();
        }
        let mut out = String::from("## Recent Permission Decisions\n\n");
        for entry in log.iter().rev().take(10).rev() {
            out.push_str(&format!(
                "- **{}** [{:?}] {}: {}\n",
                entry.timestamp.format("%H:%M:%S"),
                entry.risk_level,
                entry.tool_name,
                entry.outcome
            ));
        }
        out
    }
}

#[async_trait]
impl PermissionChecker for PermissionEngine {
    async fn check_tool(&self, tool_name: &str, args: &Value) -> PermissionVerdict {
        self.check(tool_name, args).await
    }
}
