//! Typed configuration: backend sections, MCP plane, security knobs and agent
//! tuning.
//!
//! Loading order: `qwen-tui.toml` / `config.toml` in the current directory,
//! then `$XDG_CONFIG_HOME/qwen-tui/config.toml`, then defaults. Environment
//! variables with the `QWEN_TUI_` prefix override the corresponding dotted
//! path (`QWEN_TUI_OLLAMA_HOST` -> `ollama.host`); `OPENROUTER_API_KEY` is a
//! well-known alias. Unknown keys are warnings, except inside `mcp.servers[]`
//! where they are errors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::error::ConfigError;
use crate::mcp::McpServerConfig;

/// Security permission profile. Fine-grain behavior is fixed by the permission
/// engine regardless of profile; the profile is a coarse-grain hint for UIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProfile {
    Strict,
    #[default]
    Balanced,
    Permissive,
    Custom,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout: u64,
    pub keep_alive: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 11434,
            model: "qwen2.5-coder:latest".into(),
            timeout: 300,
            keep_alive: "5m".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LmStudioConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub timeout: u64,
}

impl Default for LmStudioConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1234,
            api_key: None,
            timeout: 300,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VllmConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout: u64,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for VllmConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8000,
            model: "Qwen/Qwen2.5-Coder-7B-Instruct".into(),
            timeout: 300,
            max_tokens: 4096,
            temperature: 0.1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "qwen/qwen-2.5-coder-32b-instruct".into(),
            base_url: "https://openrouter.ai/api/v1".into(),
            timeout: 300,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub enabled: bool,
    pub servers: Vec<McpServerConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub profile: SecurityProfile,
    pub allow_file_write: bool,
    pub allow_file_delete: bool,
    pub allow_network: bool,
    pub require_approval_for: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            profile: SecurityProfile::Balanced,
            allow_file_write: true,
            allow_file_delete: false,
            allow_network: true,
            require_approval_for: vec![
                "file_delete".into(),
                "shell_exec".into(),
                "network_request".into(),
            ],
        }
    }
}

/// Main configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preferred_backends: Vec<BackendKind>,
    pub ollama: OllamaConfig,
    pub lm_studio: LmStudioConfig,
    pub vllm: VllmConfig,
    pub openrouter: OpenRouterConfig,
    pub mcp: McpConfig,
    pub security: SecurityConfig,
    pub max_context_tokens: u32,
    pub parallel_tools: u32,
    pub cache_responses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_backends: vec![BackendKind::Ollama, BackendKind::LmStudio],
            ollama: OllamaConfig::default(),
            lm_studio: LmStudioConfig::default(),
            vllm: VllmConfig::default(),
            openrouter: OpenRouterConfig::default(),
            mcp: McpConfig::default(),
            security: SecurityConfig::default(),
            max_context_tokens: 32_000,
            parallel_tools: 3,
            cache_responses: true,
        }
    }
}

const KNOWN_TOP_KEYS: &[&str] = &[
    "preferred_backends",
    "ollama",
    "lm_studio",
    "vllm",
    "openrouter",
    "mcp",
    "security",
    "max_context_tokens",
    "parallel_tools",
    "cache_responses",
];

const KNOWN_SECTION_KEYS: &[(&str, &[&str])] = &[
    ("ollama", &["host", "port", "model", "timeout", "keep_alive"]),
    ("lm_studio", &["host", "port", "api_key", "timeout"]),
    (
        "vllm",
        &["host", "port", "model", "timeout", "max_tokens", "temperature"],
    ),
    ("openrouter", &["api_key", "model", "base_url", "timeout"]),
    ("mcp", &["enabled", "servers"]),
    (
        "security",
        &[
            "profile",
            "allow_file_write",
            "allow_file_delete",
            "allow_network",
            "require_approval_for",
        ],
    ),
];

const KNOWN_MCP_SERVER_KEYS: &[&str] = &[
    "name",
    "url",
    "enabled",
    "tools",
    "timeout",
    "auth",
    "retry_attempts",
    "retry_delay",
    "health_check_interval",
];

impl Config {
    /// Parses config from TOML, validating keys. Unknown keys outside
    /// `mcp.servers[]` become warnings (returned alongside the config);
    /// unknown keys inside `mcp.servers[]` are errors.
    pub fn from_toml_str(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let raw: toml::Value = toml::from_str(content)?;
        let warnings = validate_keys(&raw)?;
        let config: Config = toml::from_str(content)?;
        Ok((config, warnings))
    }

    /// Loads configuration from the first config file found, then applies
    /// environment overrides. Missing files fall back to defaults. Warnings
    /// are logged, not fatal.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        for path in config_paths() {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match Config::from_toml_str(&content) {
                Ok((parsed, warnings)) => {
                    for warning in warnings {
                        tracing::warn!(path = %path.display(), "{}", warning);
                    }
                    config = parsed;
                }
                Err(e) => return Err(e),
            }
            break;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies `QWEN_TUI_*` environment overrides onto this config.
    /// Invalid numeric values warn and keep the existing value.
    pub fn apply_env_overrides(&mut self) {
        env_config::apply_well_known_aliases();

        if let Ok(backends) = std::env::var("QWEN_TUI_BACKENDS") {
            let parsed: Vec<BackendKind> = backends
                .split(',')
                .filter_map(|s| match s.parse() {
                    Ok(kind) => Some(kind),
                    Err(e) => {
                        tracing::warn!("ignoring backend in QWEN_TUI_BACKENDS: {}", e);
                        None
                    }
                })
                .collect();
            if !parsed.is_empty() {
                self.preferred_backends = parsed;
            }
        }

        override_string("QWEN_TUI_OLLAMA_HOST", &mut self.ollama.host);
        override_port("QWEN_TUI_OLLAMA_PORT", &mut self.ollama.port);
        override_string("QWEN_TUI_OLLAMA_MODEL", &mut self.ollama.model);
        override_u64("QWEN_TUI_OLLAMA_TIMEOUT", &mut self.ollama.timeout);
        override_string("QWEN_TUI_OLLAMA_KEEP_ALIVE", &mut self.ollama.keep_alive);

        override_string("QWEN_TUI_LM_STUDIO_HOST", &mut self.lm_studio.host);
        override_port("QWEN_TUI_LM_STUDIO_PORT", &mut self.lm_studio.port);
        if let Ok(v) = std::env::var("QWEN_TUI_LM_STUDIO_API_KEY") {
            self.lm_studio.api_key = Some(v);
        }
        override_u64("QWEN_TUI_LM_STUDIO_TIMEOUT", &mut self.lm_studio.timeout);

        override_string("QWEN_TUI_VLLM_HOST", &mut self.vllm.host);
        override_port("QWEN_TUI_VLLM_PORT", &mut self.vllm.port);
        override_string("QWEN_TUI_VLLM_MODEL", &mut self.vllm.model);
        override_u64("QWEN_TUI_VLLM_TIMEOUT", &mut self.vllm.timeout);

        override_string("QWEN_TUI_OPENROUTER_API_KEY", &mut self.openrouter.api_key);
        override_string("QWEN_TUI_OPENROUTER_MODEL", &mut self.openrouter.model);
        override_string("QWEN_TUI_OPENROUTER_BASE_URL", &mut self.openrouter.base_url);
        override_u64("QWEN_TUI_OPENROUTER_TIMEOUT", &mut self.openrouter.timeout);

        if let Ok(profile) = std::env::var("QWEN_TUI_SECURITY_PROFILE") {
            match profile.to_lowercase().as_str() {
                "strict" => self.security.profile = SecurityProfile::Strict,
                "balanced" => self.security.profile = SecurityProfile::Balanced,
                "permissive" => self.security.profile = SecurityProfile::Permissive,
                "custom" => self.security.profile = SecurityProfile::Custom,
                other => {
                    tracing::warn!("invalid QWEN_TUI_SECURITY_PROFILE: {}, keeping default", other)
                }
            }
        }
    }
}

fn override_string(key: &str, target: &mut String) {
    if let Ok(v) = std::env::var(key) {
        *target = v;
    }
}

fn override_port(key: &str, target: &mut u16) {
    if let Ok(v) = std::env::var(key) {
        match v.parse() {
            Ok(port) => *target = port,
            Err(_) => tracing::warn!("invalid port number in {}: {}, keeping default", key, v),
        }
    }
}

fn override_u64(key: &str, target: &mut u64) {
    if let Ok(v) = std::env::var(key) {
        match v.parse() {
            Ok(n) => *target = n,
            Err(_) => tracing::warn!("invalid number in {}: {}, keeping default", key, v),
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("qwen-tui.toml"), PathBuf::from("config.toml")];
    let config_dir = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir(),
    };
    if let Some(dir) = config_dir {
        paths.push(dir.join("qwen-tui").join("config.toml"));
    }
    paths
}

/// Checks the raw TOML tree for unknown keys: warnings at the top level and in
/// known sections, errors inside `mcp.servers[]`.
fn validate_keys(raw: &toml::Value) -> Result<Vec<String>, ConfigError> {
    let mut warnings = Vec::new();
    let Some(table) = raw.as_table() else {
        return Ok(warnings);
    };

    for key in table.keys() {
        if !KNOWN_TOP_KEYS.contains(&key.as_str()) {
            warnings.push(format!("unknown configuration key: {}", key));
        }
    }

    for (section, known) in KNOWN_SECTION_KEYS {
        if let Some(sub) = table.get(*section).and_then(|v| v.as_table()) {
            for key in sub.keys() {
                if !known.contains(&key.as_str()) {
                    warnings.push(format!("unknown key in [{}]: {}", section, key));
                }
            }
        }
    }

    if let Some(servers) = table
        .get("mcp")
        .and_then(|m| m.as_table())
        .and_then(|m| m.get("servers"))
        .and_then(|s| s.as_array())
    {
        for (i, server) in servers.iter().enumerate() {
            if let Some(server) = server.as_table() {
                for key in server.keys() {
                    if !KNOWN_MCP_SERVER_KEYS.contains(&key.as_str()) {
                        return Err(ConfigError::Invalid(format!(
                            "unknown key in mcp.servers[{}]: {}",
                            i, key
                        )));
                    }
                }
            }
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.lm_studio.port, 1234);
        assert_eq!(config.vllm.port, 8000);
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.max_context_tokens, 32_000);
        assert_eq!(config.parallel_tools, 3);
        assert_eq!(
            config.preferred_backends,
            vec![BackendKind::Ollama, BackendKind::LmStudio]
        );
    }

    #[test]
    fn unknown_top_level_key_is_a_warning() {
        let (config, warnings) =
            Config::from_toml_str("unknown_key = 1\n[ollama]\nport = 12345\n").unwrap();
        assert_eq!(config.ollama.port, 12345);
        assert!(warnings.iter().any(|w| w.contains("unknown_key")));
    }

    #[test]
    fn unknown_section_key_is_a_warning() {
        let (_, warnings) = Config::from_toml_str("[ollama]\nfanciness = 3\n").unwrap();
        assert!(warnings.iter().any(|w| w.contains("[ollama]: fanciness")));
    }

    #[test]
    fn unknown_mcp_server_key_is_an_error() {
        let toml = r#"
[mcp]
enabled = true

[[mcp.servers]]
name = "srv"
url = "ws://localhost:9000"
bogus = true
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn mcp_server_defaults_apply() {
        let toml = r#"
[mcp]
enabled = true

[[mcp.servers]]
name = "srv"
url = "ws://localhost:9000"
"#;
        let (config, warnings) = Config::from_toml_str(toml).unwrap();
        assert!(warnings.is_empty());
        let server = &config.mcp.servers[0];
        assert!(server.enabled);
        assert_eq!(server.timeout, 30);
        assert_eq!(server.retry_attempts, 3);
        assert_eq!(server.health_check_interval, 60);
    }

    #[test]
    fn env_override_applies_and_invalid_port_keeps_default() {
        let mut config = Config::default();
        std::env::set_var("QWEN_TUI_OLLAMA_HOST", "10.0.0.5");
        std::env::set_var("QWEN_TUI_OLLAMA_PORT", "not-a-port");
        config.apply_env_overrides();
        std::env::remove_var("QWEN_TUI_OLLAMA_HOST");
        std::env::remove_var("QWEN_TUI_OLLAMA_PORT");
        assert_eq!(config.ollama.host, "10.0.0.5");
        assert_eq!(config.ollama.port, 11434);
    }

    #[test]
    fn backends_env_override_parses_csv() {
        let mut config = Config::default();
        std::env::set_var("QWEN_TUI_BACKENDS", "vllm,openrouter");
        config.apply_env_overrides();
        std::env::remove_var("QWEN_TUI_BACKENDS");
        assert_eq!(
            config.preferred_backends,
            vec![BackendKind::Vllm, BackendKind::OpenRouter]
        );
    }
}
