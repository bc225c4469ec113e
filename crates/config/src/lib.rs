//! Configuration loading, validation, and management for IVAN.
//!
//! Loads configuration from `~/.ivan/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use ivan_core::SentinelFallback;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.ivan/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool registry settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Which transport talks to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Any `/v1/chat/completions` server (LM Studio, Ollama, OpenAI, vLLM)
    #[default]
    OpenaiCompat,
    /// A fixed reply, no network
    Canned,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "openai_compat" | "openai" | "lmstudio" => Ok(BackendKind::OpenaiCompat),
            "canned" | "dummy" => Ok(BackendKind::Canned),
            other => Err(ConfigError::ValidationError(format!(
                "unknown backend kind '{other}' (expected openai_compat or canned)"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; local servers usually need none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Reply text for the canned backend; defaults to a grammar-appropriate
    /// sentinel reply when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canned_reply: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:1234/v1".into()
}
fn default_model() -> String {
    "local-model".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_backend_timeout() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("canned_reply", &self.canned_reply)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_backend_timeout(),
            canned_reply: None,
        }
    }
}

/// Which response grammar the model is prompted with and parsed under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarKind {
    #[default]
    Json,
    Xml,
    CodeCall,
}

impl std::str::FromStr for GrammarKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "json" | "jsonbasedllm" => Ok(GrammarKind::Json),
            "xml" => Ok(GrammarKind::Xml),
            "code_call" | "code" | "lmstudio" => Ok(GrammarKind::CodeCall),
            other => Err(ConfigError::ValidationError(format!(
                "unknown grammar '{other}' (expected json, xml or code_call)"
            ))),
        }
    }
}

impl std::fmt::Display for GrammarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            GrammarKind::Json => "json",
            GrammarKind::Xml => "xml",
            GrammarKind::CodeCall => "code_call",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Response grammar
    #[serde(default)]
    pub grammar: GrammarKind,

    /// Maximum model calls per inbound message
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,

    /// Whole-run deadline in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,

    /// What an argument-less `respond_to_user` answers with
    #[serde(default)]
    pub sentinel_fallback: SentinelFallback,
}

fn default_max_cycles() -> u32 {
    8
}

impl AgentConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            grammar: GrammarKind::default(),
            max_cycles: default_max_cycles(),
            deadline_secs: None,
            sentinel_fallback: SentinelFallback::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-dispatch timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Quote currency used when an action names none
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_tool_timeout() -> u64 {
    30
}
fn default_currency() -> String {
    "usd".into()
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            default_currency: default_currency(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ivan/config.toml).
    ///
    /// Environment overrides:
    /// - `IVAN_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `LLM_API_URL` for the backend base URL
    /// - `IVAN_MODEL`, `IVAN_GRAMMAR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
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
        if self.backend.api_key.is_none() {
            self.backend.api_key = var("IVAN_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(url) = var("LLM_API_URL") {
            self.backend.base_url = url;
        }
        if let Some(model) = var("IVAN_MODEL") {
            self.backend.model = model;
        }
        if let Some(grammar) = var("IVAN_GRAMMAR") {
            self.agent.grammar = grammar.parse()?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ivan")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(ConfigError::ValidationError(
                "backend.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.backend.kind == BackendKind::OpenaiCompat && self.backend.base_url.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "backend.base_url is required for the openai_compat backend".into(),
            ));
        }

        if self.agent.max_cycles == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_cycles must be at least 1".into(),
            ));
        }

        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.timeout_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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

impl From<ConfigError> for ivan_core::Error {
    fn from(e: ConfigError) -> Self {
        ivan_core::Error::Config {
            message: e.to_string(),
        }
    }
}
