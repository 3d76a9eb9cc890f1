//! System prompt and per-turn context assembly for the ReAct agent.

use serde_json::Value;

use super::react::AgentAction;

/// Static system prompt for the ReAct loop.
pub const REACT_SYSTEM_PROMPT: &str = r#"You are an advanced AI coding assistant that follows the ReAct paradigm (Reason and Act). You have access to a set of tools for file manipulation, code analysis, and system interaction.

# Core Principles

1. **Plan-Act-Observe Loop**: Break down complex tasks into clear steps:
   - **Plan**: Analyze the problem and create a strategy
   - **Act**: Execute specific actions using your tools
   - **Observe**: Examine results and plan next steps

2. **Systematic Reasoning**: Use <think> tags for internal reasoning:
   - Analyze the current situation
   - Consider available options and tools
   - Plan the next logical step

3. **Tool Mastery**:
   - **File Operations**: Read, Write, Edit, MultiEdit for precise file manipulation
   - **Code Analysis**: Grep, Glob, LS for codebase exploration
   - **Execution**: Bash for running commands and scripts
   - **Delegation**: Task for focused sub-operations

# Tool Usage

- Always read files before editing them.
- Use Edit for single changes, MultiEdit for coordinated changes.
- Call tools as Name(key=value, ...) or wrap them in <function_call> tags.
- Explain what commands do before running them.

# Error Handling

When a tool fails, analyze the error message, consider an alternative
approach, and explain the failure to the user."#;

/// Formats the `<context name="...">` blocks injected ahead of the
/// conversation: working directory, a directory snapshot, agent state and the
/// most recent actions.
pub fn format_context(
    working_directory: &str,
    directory_snapshot: Option<&str>,
    mode: &str,
    phase: &str,
    recent_actions: &[AgentAction],
) -> String {
    let mut parts = Vec::new();

    parts.push(format!(
        "<context name=\"workingDirectory\">\n{}\n</context>",
        working_directory
    ));

    if let Some(snapshot) = directory_snapshot {
        parts.push(format!(
            "<context name=\"directoryStructure\">\n{}\n</context>",
            snapshot
        ));
    }

    parts.push(format!(
        "<context name=\"agentState\">\nMode: {}\nPhase: {}\n</context>",
        mode, phase
    ));

    if !recent_actions.is_empty() {
        let lines: Vec<String> = recent_actions
            .iter()
            .map(|action| format!("- {}: {}", action.kind.as_str(), truncate(&action.content, 100)))
            .collect();
        parts.push(format!(
            "<context name=\"recentActions\">\n{}\n</context>",
            lines.join("\n")
        ));
    }

    parts.join("\n\n")
}

/// Formats the tool-schema block: one function signature per registered tool.
pub fn format_tool_schemas(schemas: &serde_json::Map<String, Value>) -> String {
    let mut out = String::from("# Available Tools\n\n");
    for (name, schema) in schemas {
        let description = schema
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_default();
        out.push_str(&format!("## {}\n{}\n", name, description));
        if let Some(properties) = schema
            .get("parameters")
            .and_then(|p| p.get("properties"))
            .and_then(|p| p.as_object())
        {
            let required: Vec<&str> = schema
                .get("parameters")
                .and_then(|p| p.get("required"))
                .and_then(|r| r.as_array())
                .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();
            for (param, spec) in properties {
                let kind = spec.get("type").and_then(|t| t.as_str()).unwrap_or("any");
                let hint = spec
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default();
                let marker = if required.contains(&param.as_str()) {
                    " (required)"
                } else {
                    ""
                };
                out.push_str(&format!("- {}: {}{} - {}\n", param, kind, marker, hint));
            }
        }
        out.push('\n');
    }
    out
}

/// Truncates to `max` characters with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
