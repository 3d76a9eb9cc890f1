//! Integration tests for Grep, Glob and LS.

mod init_logging;

use std::path::Path;

use qwen_tui_core::{register_default_tools, ToolRegistry};
use serde_json::json;

fn registry_at(dir: &Path) -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_default_tools(&registry, dir).unwrap();
    registry
}

#[tokio::test]
async fn grep_finds_matching_lines_with_location() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.rs"), "fn main() {}\nfn helper() {}").unwrap();
    std::fs::write(dir.path().join("b.txt"), "nothing here").unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute("Grep", json!({"pattern": "fn \\w+"}))
        .await;
    assert!(result.is_success());
    let text = result.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.contains("a.rs:1:fn main() {}"));
    assert!(text.contains("a.rs:2:fn helper() {}"));
    assert_eq!(result.metadata["match_count"], json!(2));
}

/// **Boundary**: a zero-length file yields zero matches.
#[tokio::test]
async fn grep_zero_length_file_has_no_matches() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.txt"), "").unwrap();
    let registry = registry_at(dir.path());

    let result = registry.execute("Grep", json!({"pattern": "."})).await;
    assert!(result.is_success());
    assert_eq!(result.metadata["match_count"], json!(0));
}

#[tokio::test]
async fn grep_include_supports_brace_expansion() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.ts"), "export const x = 1").unwrap();
    std::fs::write(dir.path().join("b.tsx"), "export const y = 2").unwrap();
    std::fs::write(dir.path().join("c.js"), "export const z = 3").unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute(
            "Grep",
            json!({"pattern": "export const", "include": "*.{ts,tsx}"}),
        )
        .await;
    let text = result.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.contains("a.ts"));
    assert!(text.contains("b.tsx"));
    assert!(!text.contains("c.js"));
}

#[tokio::test]
async fn grep_caps_results_at_max_results() {
    let dir = tempfile::tempdir().unwrap();
    let many_lines = (0..50).map(|i| format!("match {}", i)).collect::<Vec<_>>().join("\n");
    std::fs::write(dir.path().join("big.txt"), many_lines).unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute("Grep", json!({"pattern": "match", "max_results": 10}))
        .await;
    assert_eq!(result.metadata["match_count"], json!(10));
    assert_eq!(result.metadata["truncated"], json!(true));
}

#[tokio::test]
async fn grep_skips_binary_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut binary = vec![0u8, 1, 2, 3, 255, 254];
    binary.extend_from_slice(b"match");
    binary.extend(std::iter::repeat(0u8).take(600));
    std::fs::write(dir.path().join("blob.bin"), &binary).unwrap();
    std::fs::write(dir.path().join("plain.txt"), "match").unwrap();
    let registry = registry_at(dir.path());

    let result = registry.execute("Grep", json!({"pattern": "match"})).await;
    let text = result.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.contains("plain.txt"));
    assert!(!text.contains("blob.bin"));
}

#[tokio::test]
async fn glob_matches_patterns_and_caps() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "x").unwrap();
    std::fs::write(dir.path().join("src/main.rs"), "y").unwrap();
    std::fs::write(dir.path().join("notes.md"), "z").unwrap();
    let registry = registry_at(dir.path());

    let result = registry
        .execute("Glob", json!({"pattern": "src/*.rs"}))
        .await;
    assert!(result.is_success());
    let text = result.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.contains("lib.rs"));
    assert!(text.contains("main.rs"));
    assert!(!text.contains("notes.md"));

    let capped = registry
        .execute("Glob", json!({"pattern": "src/*.rs", "max_results": 1}))
        .await;
    assert_eq!(capped.metadata["returned"], json!(1));
    assert_eq!(capped.metadata["truncated"], json!(true));
}

#[tokio::test]
async fn glob_no_match_reports_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_at(dir.path());
    let result = registry
        .execute("Glob", json!({"pattern": "**/*.xyz"}))
        .await;
    assert!(result.is_success());
    let text = result.result.unwrap();
    assert!(text.as_str().unwrap().contains("No files matching"));
}

#[tokio::test]
async fn ls_lists_directory_with_recursion_bound() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
    std::fs::write(dir.path().join("top.txt"), "x").unwrap();
    std::fs::write(dir.path().join("a/mid.txt"), "y").unwrap();
    std::fs::write(dir.path().join("a/b/deep.txt"), "z").unwrap();
    let registry = registry_at(dir.path());

    let flat = registry.execute("LS", json!({})).await;
    let text = flat.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.contains("top.txt"));
    assert!(text.contains("\na/"));
    assert!(!text.contains("mid.txt"));

    let deep = registry
        .execute("LS", json!({"recursive": true, "max_depth": 2}))
        .await;
    let text = deep.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.contains("mid.txt"));
    assert!(!text.contains("deep.txt"));
}

#[tokio::test]
async fn ls_honors_hidden_and_ignore() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".hidden"), "x").unwrap();
    std::fs::write(dir.path().join("shown.log"), "y").unwrap();
    std::fs::write(dir.path().join("kept.txt"), "z").unwrap();
    let registry = registry_at(dir.path());

    let default = registry.execute("LS", json!({})).await;
    let text = default.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(!text.contains(".hidden"));

    let with_hidden = registry
        .execute("LS", json!({"show_hidden": true, "ignore": ["*.log"]}))
        .await;
    let text = with_hidden.result.unwrap();
    let text = text.as_str().unwrap().to_string();
    assert!(text.contains(".hidden"));
    assert!(!text.contains("shown.log"));
    assert!(text.contains("kept.txt"));
}
