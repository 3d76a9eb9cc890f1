//! ReAct agent: the Plan -> Act -> Observe loop over the backend manager and
//! tool registry.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::Stream;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use crate::backend::{BackendKind, BackendManager, LlmRequest};
use crate::message::Message;
use crate::stream::AgentEvent;
use crate::thinking::{filter_thinking, StreamingThinkFilter};
use crate::tools::{ToolCall, ToolRegistry, ToolStatus};

use super::extract::extract_tool_calls;
use super::prompt::{format_context, format_tool_schemas, truncate, REACT_SYSTEM_PROMPT};

/// How the agent is being driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentMode {
    Interactive,
    Autonomous,
    Planning,
    Execution,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Interactive => "interactive",
            AgentMode::Autonomous => "autonomous",
            AgentMode::Planning => "planning",
            AgentMode::Execution => "execution",
        }
    }
}

/// Where the agent is inside one reasoning cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasoningPhase {
    Analysis,
    Planning,
    ToolSelection,
    Execution,
    Synthesis,
    Reflection,
}

impl ReasoningPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningPhase::Analysis => "analysis",
            ReasoningPhase::Planning => "planning",
            ReasoningPhase::ToolSelection => "tool_selection",
            ReasoningPhase::Execution => "execution",
            ReasoningPhase::Synthesis => "synthesis",
            ReasoningPhase::Reflection => "reflection",
        }
    }
}

/// Kind of one recorded agent action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Think,
    ToolUse,
    Respond,
    Plan,
    Observe,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Think => "think",
            ActionKind::ToolUse => "tool_use",
            ActionKind::Respond => "respond",
            ActionKind::Plan => "plan",
            ActionKind::Observe => "observe",
        }
    }
}

/// One entry of the action history.
#[derive(Clone, Debug)]
pub struct AgentAction {
    pub kind: ActionKind,
    pub content: String,
    pub tool_name: Option<String>,
    pub tool_params: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl AgentAction {
    pub fn new(kind: ActionKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool_name: None,
            tool_params: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool(name: impl Into<String>, params: Value) -> Self {
        let name = name.into();
        Self {
            kind: ActionKind::ToolUse,
            content: format!("{} with params", name),
            tool_name: Some(name),
            tool_params: Some(params),
            timestamp: Utc::now(),
        }
    }
}

const CONVERSATION_WINDOW: usize = 10;
const HISTORY_LIMIT: usize = 20;
const RECENT_ACTIONS: usize = 5;
const OBSERVE_SUMMARY_CHARS: usize = 200;
const THINKING_PREVIEW_CHARS: usize = 80;

/// ReAct agent. Owns the per-session conversation and action history; the
/// backend manager and tool registry are shared with the rest of the core.
pub struct ReActAgent {
    manager: Arc<BackendManager>,
    registry: Arc<ToolRegistry>,
    session_id: String,
    working_directory: PathBuf,
    mode: Mutex<AgentMode>,
    phase: Mutex<ReasoningPhase>,
    context: Mutex<Map<String, Value>>,
    action_history: Mutex<Vec<AgentAction>>,
    conversation_history: Mutex<Vec<Message>>,
    preferred_backend: Mutex<Option<BackendKind>>,
}

impl ReActAgent {
    pub fn new(
        manager: Arc<BackendManager>,
        registry: Arc<ToolRegistry>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manager,
            registry,
            session_id: uuid::Uuid::new_v4().to_string(),
            working_directory: working_directory.into(),
            mode: Mutex::new(AgentMode::Interactive),
            phase: Mutex::new(ReasoningPhase::Analysis),
            context: Mutex::new(Map::new()),
            action_history: Mutex::new(Vec::new()),
            conversation_history: Mutex::new(Vec::new()),
            preferred_backend: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn working_directory(&self) -> &PathBuf {
        &self.working_directory
    }

    pub fn mode(&self) -> AgentMode {
        *self.mode.lock().unwrap()
    }

    pub fn set_mode(&self, mode: AgentMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_preferred_backend(&self, kind: Option<BackendKind>) {
        *self.preferred_backend.lock().unwrap() = kind;
    }

    /// Sets a context key visible to later turns.
    pub fn set_context(&self, key: impl Into<String>, value: Value) {
        self.context.lock().unwrap().insert(key.into(), value);
    }

    pub fn conversation_history(&self) -> Vec<Message> {
        self.conversation_history.lock().unwrap().clone()
    }

    fn record(&self, action: AgentAction) {
        self.action_history.lock().unwrap().push(action);
    }

    /// Directory snapshot for the context block, captured through the LS tool
    /// so it honors the same ignore rules the model sees elsewhere.
    async fn directory_snapshot(&self) -> Option<String> {
        let result = self
            .registry
            .execute("LS", json!({ "recursive": true, "max_depth": 2 }))
            .await;
        if result.is_success() {
            result.result.and_then(|v| v.as_str().map(String::from))
        } else {
            tracing::warn!(error = ?result.error, "failed to capture directory snapshot");
            None
        }
    }

    /// Assembles the prompt set for one turn.
    async fn build_messages(&self, user_message: &str) -> Vec<Message> {
        let snapshot = self.directory_snapshot().await;
        let (mode, phase) = (self.mode(), *self.phase.lock().unwrap());
        let recent: Vec<AgentAction> = {
            let history = self.action_history.lock().unwrap();
            history.iter().rev().take(RECENT_ACTIONS).rev().cloned().collect()
        };
        let context_block = format_context(
            &self.working_directory.to_string_lossy(),
            snapshot.as_deref(),
            mode.as_str(),
            phase.as_str(),
            &recent,
        );
        let tool_block = format_tool_schemas(&self.registry.schemas());

        let mut messages = vec![
            Message::system(REACT_SYSTEM_PROMPT),
            Message::system(context_block),
            Message::system(tool_block),
        ];
        {
            let history = self.conversation_history.lock().unwrap();
            let start = history.len().saturating_sub(CONVERSATION_WINDOW);
            messages.extend(history[start..].iter().cloned());
        }
        messages.push(Message::user(user_message));
        messages
    }

    /// Processes one user message, yielding visible text, thinking previews
    /// and tool progress.
    pub fn send_message<'a>(
        &'a self,
        user_message: &'a str,
    ) -> impl Stream<Item = AgentEvent> + Send + 'a {
        async_stream::stream! {
            self.record(AgentAction::new(
                ActionKind::Respond,
                format!("Processing user message: {}", truncate(user_message, 100)),
            ));

            let messages = self.build_messages(user_message).await;
            let request = LlmRequest {
                messages,
                tools: Some(self.registry.openai_function_schemas()),
                stream: true,
                ..Default::default()
            };
            let preferred = *self.preferred_backend.lock().unwrap();

            let mut stream = match self.manager.generate(request, preferred, true).await {
                Ok(stream) => stream,
                Err(e) => {
                    yield AgentEvent::visible(crate::error::user_message(&e));
                    return;
                }
            };

            let mut filter = StreamingThinkFilter::new();
            let mut raw_content = String::new();
            let mut structured_calls: Option<Vec<ToolCall>> = None;
            let mut thinking_seen = String::new();
            let mut failed = false;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(response) => {
                        if response.is_partial {
                            let delta = response.delta.clone().unwrap_or_default();
                            raw_content.push_str(&delta);
                            let out = filter.push(&delta);
                            if !out.visible.is_empty() {
                                yield AgentEvent::visible(out.visible);
                            }
                            if !out.thinking.is_empty() {
                                thinking_seen.push_str(&out.thinking);
                                if let Some(preview) = thinking_preview(&thinking_seen) {
                                    yield AgentEvent::thinking(preview);
                                }
                            }
                        } else {
                            if raw_content.is_empty() && !response.content.is_empty() {
                                // Non-streamed terminal (or a provider that only
                                // sends the final chunk): run it through the
                                // filter as one piece.
                                raw_content.push_str(&response.content);
                                let out = filter.push(&response.content);
                                if !out.visible.is_empty() {
                                    yield AgentEvent::visible(out.visible);
                                }
                                if !out.thinking.is_empty() {
                                    thinking_seen.push_str(&out.thinking);
                                }
                            }
                            structured_calls = response.tool_calls.clone();
                        }
                    }
                    Err(e) => {
                        yield AgentEvent::visible(format!("\n{}", crate::error::user_message(&e)));
                        failed = true;
                        break;
                    }
                }
            }

            let tail = filter.finish();
            if !tail.visible.is_empty() {
                yield AgentEvent::visible(tail.visible.clone());
            }
            if !tail.thinking.is_empty() {
                thinking_seen.push_str(&tail.thinking);
            }

            let (visible_text, thinking_text) = filter_thinking(&raw_content);
            if !thinking_text.is_empty() {
                self.record(AgentAction::new(ActionKind::Think, thinking_text));
            }

            // Prefer native tool calls from the provider; fall back to the
            // text recognizers over the visible output.
            let calls = match structured_calls.filter(|c| !c.is_empty()) {
                Some(calls) => calls,
                None => extract_tool_calls(&visible_text, &self.registry.list_tools()),
            };

            let mut assistant = Message::assistant(visible_text.clone());
            if !calls.is_empty() {
                assistant = assistant.with_tool_calls(calls.clone());
            }

            if !failed {
                for call in &calls {
                    let params = Value::Object(call.arguments.clone());
                    yield AgentEvent::ToolProgress {
                        tool: call.name.clone(),
                        status: ToolStatus::Running,
                        parameters: Some(params.clone()),
                        result: None,
                        error: None,
                    };
                    self.record(AgentAction::tool(&call.name, params.clone()));

                    let result = self.registry.execute(&call.name, params.clone()).await;

                    let observed = if result.is_success() {
                        format!(
                            "Tool {} succeeded: {}",
                            call.name,
                            truncate(
                                &result
                                    .result
                                    .as_ref()
                                    .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                                    .unwrap_or_default(),
                                OBSERVE_SUMMARY_CHARS
                            )
                        )
                    } else {
                        format!(
                            "Tool {} failed: {}",
                            call.name,
                            truncate(result.error.as_deref().unwrap_or("unknown error"), OBSERVE_SUMMARY_CHARS)
                        )
                    };
                    self.record(AgentAction::new(ActionKind::Observe, observed));

                    yield AgentEvent::ToolProgress {
                        tool: call.name.clone(),
                        status: result.status,
                        parameters: None,
                        result: result.result.clone(),
                        error: result.error.clone(),
                    };
                }
            }

            let mut history = self.conversation_history.lock().unwrap();
            history.push(Message::user(user_message));
            history.push(assistant);
            if history.len() > HISTORY_LIMIT {
                let excess = history.len() - HISTORY_LIMIT;
                history.drain(..excess);
            }
        }
    }

    /// Runs one task autonomously: wraps it in a Plan/Act/Observe preamble and
    /// collects the visible output.
    pub async fn execute_autonomous_task(&self, task: &str) -> String {
        self.set_mode(AgentMode::Autonomous);
        *self.phase.lock().unwrap() = ReasoningPhase::Analysis;

        let prompt = format!(
            "I need to complete this task autonomously: {}\n\n\
             Please follow the Plan-Act-Observe methodology:\n\n\
             1. **Analyze** the task requirements thoroughly\n\
             2. **Plan** a comprehensive approach\n\
             3. **Execute** the plan using available tools\n\
             4. **Observe** results and adapt as needed\n\
             5. **Summarize** what was accomplished",
            task
        );

        let mut output = String::new();
        let stream = self.send_message(&prompt);
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            if let AgentEvent::Visible { text } = event {
                output.push_str(&text);
            }
        }
        output
    }

    /// Drops conversation, action history and context keys.
    pub fn clear_context(&self) {
        self.conversation_history.lock().unwrap().clear();
        self.action_history.lock().unwrap().clear();
        self.context.lock().unwrap().clear();
        tracing::info!(session = %self.session_id, "cleared agent context");
    }

    /// Compacts the conversation: keeps all system messages plus the last six
    /// entries (three exchanges). Returns a short summary of what was kept.
    pub fn compact_context(&self) -> String {
        let mut history = self.conversation_history.lock().unwrap();
        if history.len() <= CONVERSATION_WINDOW {
            return "Context is already compact.".to_string();
        }
        let system: Vec<Message> = history
            .iter()
            .filter(|m| m.role == crate::message::Role::System)
            .cloned()
            .collect();
        let recent: Vec<Message> = history
            .iter()
            .rev()
            .take(6)
            .rev()
            .cloned()
            .collect();
        let kept_system = system.len();
        *history = system.into_iter().chain(recent).collect();
        format!(
            "Compacted conversation history. Kept {} system messages and 6 recent messages.",
            kept_system
        )
    }

    /// Markdown summary of the last ten actions.
    pub fn action_summary(&self) -> String {
        let history = self.action_history.lock().unwrap();
        if history.is_empty() {
            return "No actions taken yet.".to_string();
        }
        let mut out = String::from("## Recent Actions\n\n");
        for action in history.iter().rev().take(10).rev() {
            out.push_str(&format!(
                "- **{}** [{}]: {}\n",
                action.timestamp.format("%H:%M:%S"),
                action.kind.as_str(),
                truncate(&action.content, 100)
            ));
        }
        out
    }
}

/// Last line of the accumulated thinking, capped for the preview channel.
fn thinking_preview(thinking: &str) -> Option<String> {
    let line = thinking.lines().last()?.trim();
    if line.is_empty() {
        return None;
    }
    Some(truncate(line, THINKING_PREVIEW_CHARS))
}

