//! Configuration loading, validation, and management for Smore.
//!
//! Loads configuration from `~/.smore/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.smore/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Display name, reported by `/health` and the CLI banner
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Base framing for the top-level loop (tools and notes are appended)
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Language-model backend
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Top-level orchestration loop
    #[serde(default)]
    pub agent: AgentConfig,

    /// Nested (subagent) loops
    #[serde(default)]
    pub subagents: SubagentConfig,

    /// Long-term note store
    #[serde(default)]
    pub memory: MemoryConfig,

    /// HTTP / WebSocket gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_assistant_name() -> String {
    "Smore Assistant".into()
}

fn default_system_prompt() -> String {
    "You are a helpful personal assistant. You can help with tasks, answer questions, and control various services.\n\
     Be concise and helpful. If you don't know something, say so."
        .into()
}

/// Which wire protocol the backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama native `/api/chat`
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint
    Openai,
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai_compat" | "openai-compatible" => Ok(Self::Openai),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{other}' (expected 'ollama' or 'openai')"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    /// Endpoint base URL; defaults depend on `kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Ollama
}
fn default_model() -> String {
    "gemma3:12b".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl ProviderConfig {
    /// Base URL with the per-kind default applied.
    pub fn resolved_base_url(&self) -> String {
        match (&self.base_url, self.kind) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, ProviderKind::Ollama) => "http://localhost:11434".into(),
            (None, ProviderKind::Openai) => "https://api.openai.com/v1".into(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: None,
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iteration budget of a top-level turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Inject a progress-check prompt every N iterations after a tool call
    #[serde(default = "default_steer_every")]
    pub steer_every: u32,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_steer_every() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            steer_every: default_steer_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_subagent_iterations")]
    pub max_iterations: u32,

    /// Register the built-in subagent presets
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_depth() -> u32 {
    2
}
fn default_subagent_iterations() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_iterations: default_subagent_iterations(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "file", "in_memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Notes file; defaults to `~/.smore/memory.md`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_memory_backend() -> String {
    "file".into()
}
fn default_max_chars() -> usize {
    2000
}

impl MemoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memory.md"))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            max_chars: default_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8888
}
fn default_host() -> String {
    "0.0.0.0".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.smore/config.toml).
    ///
    /// Environment variables override the file:
    /// - `SMORE_PROVIDER`, `SMORE_MODEL`, `SMORE_BASE_URL`
    /// - `SMORE_API_KEY`, then `OPENAI_API_KEY`
    /// - `SMORE_MEMORY_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(kind) = var("SMORE_PROVIDER") {
            self.provider.kind = kind.parse()?;
        }
        if let Some(model) = var("SMORE_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = var("SMORE_BASE_URL") {
            self.provider.base_url = Some(url);
        }
        if self.provider.api_key.is_none() {
            self.provider.api_key = var("SMORE_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(path) = var("SMORE_MEMORY_PATH") {
            self.memory.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".smore")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 || self.subagents.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.steer_every == 0 {
            return Err(ConfigError::ValidationError(
                "agent.steer_every must be at least 1".into(),
            ));
        }

        if self.subagents.max_depth > 8 {
            return Err(ConfigError::ValidationError(
                "subagents.max_depth must be 8 or less".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "file" | "in_memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}'",
                self.memory.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            system_prompt: default_system_prompt(),
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            subagents: SubagentConfig::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.kind, ProviderKind::Ollama);
        assert_eq!(config.provider.model, "gemma3:12b");
        assert_eq!(config.gateway.port, 8888);
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.subagents.max_iterations, 5);
        assert_eq!(config.subagents.max_depth, 2);
        assert_eq!(config.memory.max_chars, 2000);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.assistant_name, config.assistant_name);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.provider.kind, config.provider.kind);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
assistant_name = "Pip"

[provider]
kind = "openai"
model = "gpt-4o-mini"

[subagents]
max_depth = 1
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.assistant_name, "Pip");
        assert_eq!(config.provider.kind, ProviderKind::Openai);
        assert_eq!(config.provider.resolved_base_url(), "https://api.openai.com/v1");
        assert_eq!(config.subagents.max_depth, 1);
        assert_eq!(config.subagents.max_iterations, 5);
        assert_eq!(config.agent.steer_every, 3);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_memory_backend_rejected() {
        let mut config = AppConfig::default();
        config.memory.backend = "sqlite".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.assistant_name, "Smore Assistant");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nport = 9000\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "0.0.0.0");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway\nport = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("SMORE_PROVIDER", "openai"),
            ("SMORE_MODEL", "gpt-4o"),
            ("SMORE_BASE_URL", "http://proxy:8080/v1/"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SMORE_MEMORY_PATH", "/tmp/notes.md"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.provider.kind, ProviderKind::Openai);
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.provider.resolved_base_url(), "http://proxy:8080/v1");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.memory.resolved_path(), PathBuf::from("/tmp/notes.md"));
    }

    #[test]
    fn bad_provider_env_is_error() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|k| (k == "SMORE_PROVIDER").then(|| "bard".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemma3:12b"));
        assert!(toml_str.contains("8888"));
    }
}
