//! Grep tool: regex search across a directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

use super::path::resolve_path;

/// Tool name for content search.
pub const TOOL_GREP: &str = "Grep";

const DEFAULT_MAX_RESULTS: usize = 100;

/// Extensions always treated as text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rst", "py", "rs", "js", "jsx", "ts", "tsx", "json", "yaml", "yml", "toml",
    "ini", "cfg", "conf", "sh", "bash", "zsh", "c", "h", "cpp", "hpp", "cc", "go", "java", "rb",
    "php", "html", "htm", "css", "scss", "xml", "sql", "csv", "log", "lock", "env", "gitignore",
];

/// Extensions always treated as binary.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "pdf", "zip", "tar", "gz", "bz2", "xz", "7z",
    "exe", "dll", "so", "dylib", "o", "a", "class", "pyc", "wasm", "woff", "woff2", "ttf", "mp3",
    "mp4", "avi", "mov", "sqlite", "db",
];

/// Searches file contents with a compiled regular expression.
///
/// Include/exclude globs support `{a,b}` brace alternation. Binary files are
/// skipped via an extension allowlist plus a printable-byte heuristic. Matches
/// are ordered by file mtime, newest first, capped at `max_results`.
pub struct GrepTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl GrepTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

/// Expands one level of `{a,b}` brace alternation into plain glob patterns.
pub(crate) fn expand_braces(pattern: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (pattern.find('{'), pattern.find('}')) else {
        return vec![pattern.to_string()];
    };
    if close < open {
        return vec![pattern.to_string()];
    }
    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut out = Vec::new();
    for alt in pattern[open + 1..close].split(',') {
        let expanded = format!("{}{}{}", prefix, alt, suffix);
        // Recurse for nested/multiple brace groups.
        out.extend(expand_braces(&expanded));
    }
    out
}

fn compile_globs(pattern: Option<&str>) -> Result<Vec<glob::Pattern>, ToolError> {
    let Some(pattern) = pattern else {
        return Ok(Vec::new());
    };
    expand_braces(pattern)
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| ToolError::Parameter(format!("invalid glob '{}': {}", p, e)))
        })
        .collect()
}

fn glob_matches(path: &Path, patterns: &[glob::Pattern]) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    patterns
        .iter()
        .any(|p| p.matches(name) || p.matches(&path.to_string_lossy()))
}

/// Text-file check: extension allowlist, binary denylist, then a printable
/// heuristic over the first 512 bytes (>= 70% printable).
fn is_text_file(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_ascii_lowercase();
        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
    }
    use std::io::Read;
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut sample = [0u8; 512];
    let Ok(n) = file.read(&mut sample) else {
        return false;
    };
    if n == 0 {
        // Zero-length files are trivially text; they just have no matches.
        return true;
    }
    let printable = sample[..n]
        .iter()
        .filter(|b| b.is_ascii_graphic() || b.is_ascii_whitespace() || **b >= 0x80)
        .count();
    printable as f64 / n as f64 > 0.7
}

fn file_mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        TOOL_GREP
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search (default: working directory)"
                },
                "include": {
                    "type": "string",
                    "description": "Glob filter for files to include, e.g. *.{ts,tsx}"
                },
                "exclude": {
                    "type": "string",
                    "description": "Glob filter for files to exclude"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of matching lines",
                    "minimum": 1,
                    "default": DEFAULT_MAX_RESULTS
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let pattern = args
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing pattern".to_string()))?;
        let regex = regex::RegexBuilder::new(pattern)
            .multi_line(true)
            .build()
            .map_err(|e| ToolError::Parameter(format!("invalid regex: {}", e)))?;

        let raw_path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let root = resolve_path(&self.working_directory, raw_path)?;
        if !root.exists() {
            return Err(ToolError::FileSystem(format!(
                "path not found: {}",
                root.display()
            )));
        }

        let include = compile_globs(args.get("include").and_then(|v| v.as_str()))?;
        let exclude = compile_globs(args.get("exclude").and_then(|v| v.as_str()))?;
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        // Walk respecting .gitignore, skipping hidden entries.
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in ignore::WalkBuilder::new(&root).build().filter_map(Result::ok) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if !include.is_empty() && !glob_matches(path, &include) {
                continue;
            }
            if glob_matches(path, &exclude) {
                continue;
            }
            if !is_text_file(path) {
                continue;
            }
            files.push(path.to_path_buf());
        }

        // Newest files first, so the cap keeps the most recently touched matches.
        files.sort_by_key(|p| std::cmp::Reverse(file_mtime(p)));

        let mut matches: Vec<String> = Vec::new();
        let mut files_matched = 0usize;
        'outer: for file in &files {
            let Ok(content) = std::fs::read_to_string(file) else {
                continue;
            };
            let mut matched_this_file = false;
            for (lineno, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matched_this_file = true;
                    let display = file.strip_prefix(&root).unwrap_or(file);
                    matches.push(format!("{}:{}:{}", display.display(), lineno + 1, line));
                    if matches.len() >= max_results {
                        files_matched += 1;
                        break 'outer;
                    }
                }
            }
            if matched_this_file {
                files_matched += 1;
            }
        }

        let text = if matches.is_empty() {
            format!("No matches for pattern: {}", pattern)
        } else {
            matches.join("\n")
        };

        Ok(ToolOutput::text(text)
            .with_metadata("match_count", json!(matches.len()))
            .with_metadata("files_matched", json!(files_matched))
            .with_metadata("truncated", json!(matches.len() >= max_results)))
    }
}
