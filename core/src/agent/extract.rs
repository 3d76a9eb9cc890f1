//! Tool-call extraction from free-form model text.
//!
//! Two recognizers are tried in order: the explicit
//! `<function_call>Name(args)</function_call>` form and a bare `Name(args)`
//! form restricted to registered tool names. The recognizer list is
//! data-driven so new forms can be added without touching the agent loop.
//! Arguments parse as JSON when they start with `{`, else as comma-separated
//! `key=value` pairs with scalar coercion.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Number, Value};

use crate::tools::ToolCall;

static FUNCTION_CALL: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"<function_call>\s*(\w+)\((.*?)\)\s*</function_call>")
        .dot_matches_new_line(true)
        .build()
        .unwrap()
});

/// One recognizer: finds `(name, raw_args)` pairs in the text.
struct Recognizer {
    name: &'static str,
    find: fn(&str, &[String]) -> Vec<(String, String)>,
}

fn find_function_call_form(content: &str, _known: &[String]) -> Vec<(String, String)> {
    FUNCTION_CALL
        .captures_iter(content)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn find_bare_form(content: &str, known: &[String]) -> Vec<(String, String)> {
    // Strip the explicit form first so its calls are not matched twice.
    let stripped = FUNCTION_CALL.replace_all(content, "");
    let mut calls = Vec::new();
    for tool_name in known {
        let pattern = format!(r"\b{}\s*\(\s*(.*?)\s*\)", regex::escape(tool_name));
        let Ok(re) = RegexBuilder::new(&pattern).dot_matches_new_line(true).build() else {
            continue;
        };
        for caps in re.captures_iter(&stripped) {
            calls.push((tool_name.clone(), caps[1].to_string()));
        }
    }
    calls
}

const RECOGNIZERS: &[Recognizer] = &[
    Recognizer {
        name: "function_call",
        find: find_function_call_form,
    },
    Recognizer {
        name: "bare",
        find: find_bare_form,
    },
];

/// Extracts tool calls from the visible model output.
///
/// Bare-form matches only fire for names in `known_tools`. Calls whose
/// arguments cannot be parsed are skipped with a warning, never an error.
pub fn extract_tool_calls(content: &str, known_tools: &[String]) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for recognizer in RECOGNIZERS {
        for (name, raw_args) in (recognizer.find)(content, known_tools) {
            match parse_parameters(&raw_args) {
                Ok(arguments) => {
                    let id = format!("call_{}", calls.len());
                    calls.push(ToolCall::new(id, name, arguments));
                }
                Err(e) => {
                    tracing::warn!(
                        recognizer = recognizer.name,
                        tool = %name,
                        error = %e,
                        "failed to parse tool call, skipping"
                    );
                }
            }
        }
    }
    calls
}

/// Parses a raw argument string: JSON object, or `key=value` CSV with
/// true/false, integer and float coercion.
pub fn parse_parameters(raw: &str) -> Result<Map<String, Value>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }

    if raw.starts_with('{') {
        return match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err("JSON arguments must be an object".to_string()),
            Err(e) => Err(format!("invalid JSON arguments: {}", e)),
        };
    }

    let mut params = Map::new();
    for part in split_top_level_commas(raw) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        if key.is_empty() {
            continue;
        }
        params.insert(key.to_string(), coerce_scalar(value));
    }
    Ok(params)
}

/// Splits on commas that are not inside quotes, so quoted values may contain
/// commas.
fn split_top_level_commas(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in raw.chars() {
        match (c, quote) {
            ('"', None) | ('\'', None) => {
                quote = Some(c);
                current.push(c);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            (',', None) => {
                parts.push(std::mem::take(&mut current));
            }
            (c, _) => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn coerce_scalar(value: &str) -> Value {
    match value.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if value.chars().all(|c| c.is_ascii_digit()) && !value.is_empty() {
        if let Ok(n) = value.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if value.parse::<f64>().is_ok() && value.contains('.') {
        if let Some(n) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["Read".to_string(), "Bash".to_string(), "Grep".to_string()]
    }

    #[test]
    fn explicit_function_call_form() {
        let calls = extract_tool_calls(
            r#"<function_call>Read(file_path="src/main.rs")</function_call>"#,
            &known(),
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "Read");
        assert_eq!(calls[0].arguments["file_path"], "src/main.rs");
    }

    #[test]
    fn bare_form_restricted_to_known_tools() {
        let calls = extract_tool_calls(r#"Let me run Bash(command="ls -la") now"#, &known());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "Bash");
        assert_eq!(calls[0].arguments["command"], "ls -la");

        let none = extract_tool_calls(r#"Frobnicate(x=1)"#, &known());
        assert!(none.is_empty());
    }

    #[test]
    fn json_arguments_parse_directly() {
        let calls = extract_tool_calls(
            r#"<function_call>Grep({"pattern": "fn main", "max_results": 5})</function_call>"#,
            &known(),
        );
        assert_eq!(calls[0].arguments["pattern"], "fn main");
        assert_eq!(calls[0].arguments["max_results"], 5);
    }

    #[test]
    fn key_value_coercion() {
        let params = parse_parameters("count=3, ratio=0.5, deep=true, name=abc").unwrap();
        assert_eq!(params["count"], 3);
        assert_eq!(params["ratio"], 0.5);
        assert_eq!(params["deep"], true);
        assert_eq!(params["name"], "abc");
    }

    #[test]
    fn quoted_value_keeps_commas() {
        let params = parse_parameters(r#"command="echo a, b, c""#).unwrap();
        assert_eq!(params["command"], "echo a, b, c");
    }

    #[test]
    fn explicit_form_not_double_counted_by_bare_recognizer() {
        let calls = extract_tool_calls(
            r#"<function_call>Read(file_path="a.txt")</function_call>"#,
            &known(),
        );
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn empty_arguments_yield_empty_map() {
        let calls = extract_tool_calls("Read()", &known());
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.is_empty());
    }
}
