//! Environment loading for qwen-tui settings.
//!
//! All qwen-tui configuration travels as `QWEN_TUI_*` environment variables;
//! the typed config layer in the core crate reads them back. This crate fills
//! the process environment from two optional sources, with priority
//! **existing env > project `.env` > XDG `config.toml` `[env]` table**, and it
//! only ever touches qwen-tui's own variables: `QWEN_TUI_*` plus the
//! well-known aliases in [`WELL_KNOWN_KEYS`]. Anything else found in those
//! files is left alone, so a shared `.env` cannot leak unrelated settings
//! into the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application name used for the XDG path `~/.config/qwen-tui/config.toml`.
pub const APP_NAME: &str = "qwen-tui";

/// Prefix for all qwen-tui environment variables.
pub const ENV_PREFIX: &str = "QWEN_TUI_";

/// Unprefixed variables qwen-tui also honors. `OPENROUTER_API_KEY` is the
/// provider's conventional name; it is mirrored to the prefixed form by
/// [`apply_well_known_aliases`].
pub const WELL_KNOWN_KEYS: &[&str] = &["OPENROUTER_API_KEY"];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
}

/// Whether this key belongs to qwen-tui and may be applied to the process
/// environment.
fn is_qwen_tui_key(key: &str) -> bool {
    key.starts_with(ENV_PREFIX) || WELL_KNOWN_KEYS.contains(&key)
}

/// Strips one pair of matching surrounding quotes, shell style.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Collects qwen-tui variables from `.env`-style content.
///
/// Recognized lines are `KEY=VALUE` and `export KEY=VALUE`; blank lines and
/// `#` comments are skipped. Values keep everything after the first `=`
/// (trimmed, one level of quotes stripped). Keys outside the qwen-tui set are
/// ignored rather than applied.
fn qwen_tui_vars_from_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !is_qwen_tui_key(key) {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

/// Collects qwen-tui variables from the `[env]` table of an XDG config file.
///
/// Only string values are taken; other TOML types and foreign keys are
/// skipped. A file without an `[env]` table contributes nothing.
fn qwen_tui_vars_from_toml(content: &str) -> Result<HashMap<String, String>, LoadError> {
    let root: toml::Value = toml::from_str(content)?;
    let mut vars = HashMap::new();
    if let Some(table) = root.get("env").and_then(|v| v.as_table()) {
        for (key, value) in table {
            if !is_qwen_tui_key(key) {
                continue;
            }
            if let Some(s) = value.as_str() {
                vars.insert(key.clone(), s.to_string());
            }
        }
    }
    Ok(vars)
}

fn dotenv_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    path.is_file().then_some(path)
}

fn xdg_config_path() -> Option<PathBuf> {
    // An explicit XDG_CONFIG_HOME wins over the platform config dir so tests
    // and non-standard setups work.
    let config_dir = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()?,
    };
    let path = config_dir.join(APP_NAME).join("config.toml");
    path.is_file().then_some(path)
}

/// Loads qwen-tui variables from the project `.env` (current directory, or
/// `override_dir` if given) and `$XDG_CONFIG_HOME/qwen-tui/config.toml`, then
/// sets only those that are **not** already in the process environment.
///
/// Precedence for a key missing from the environment: `.env` value first,
/// XDG value second. Missing files are fine. After merging,
/// [`apply_well_known_aliases`] runs so `OPENROUTER_API_KEY` from any source
/// reaches the typed config layer.
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let mut merged = match xdg_config_path() {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
            qwen_tui_vars_from_toml(&content)?
        }
        None => HashMap::new(),
    };
    if let Some(path) = dotenv_path(override_dir) {
        let content = std::fs::read_to_string(&path).map_err(LoadError::DotenvRead)?;
        // .env overrides XDG for the same key.
        merged.extend(qwen_tui_vars_from_dotenv(&content));
    }

    for (key, value) in merged {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
        }
    }

    apply_well_known_aliases();

    Ok(())
}

/// Mirrors well-known unprefixed variables into their `QWEN_TUI_` form.
///
/// Currently only `OPENROUTER_API_KEY` -> `QWEN_TUI_OPENROUTER_API_KEY`. The
/// prefixed variable wins when both are set.
pub fn apply_well_known_aliases() {
    if std::env::var("QWEN_TUI_OPENROUTER_API_KEY").is_err() {
        if let Ok(v) = std::env::var("OPENROUTER_API_KEY") {
            std::env::set_var("QWEN_TUI_OPENROUTER_API_KEY", v);
        }
    }
}
