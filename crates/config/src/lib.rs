//! Configuration loading, validation, and management for TurnLoop.
//!
//! Loads configuration from `~/.turnloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use turnloop_core::{AgenticTurnOptions, ChatOptions};

/// The root configuration structure.
///
/// Maps directly to `~/.turnloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Turn loop budgets
    #[serde(default)]
    pub agentic: AgenticConfig,

    /// Settings forwarded to the provider on every chat call
    #[serde(default)]
    pub chat: ChatConfig,

    /// Transcript retention
    #[serde(default)]
    pub history: HistoryConfig,

    /// Built-in tool policy
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Extra phrases for the continuation heuristic
    #[serde(default)]
    pub continuation: ContinuationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenticConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub debug: bool,
}

fn default_max_turns() -> u32 {
    10
}
fn default_max_tool_calls() -> u32 {
    50
}
fn default_timeout_ms() -> u64 {
    300_000
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_tool_calls: default_max_tool_calls(),
            timeout_ms: default_timeout_ms(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    turnloop_core::message::DEFAULT_MAX_MESSAGES
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Programs `run_command` may start
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// Paths the file tools refuse to touch
    #[serde(default)]
    pub forbidden_paths: Vec<String>,

    /// When non-empty, file tools stay inside these roots
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_commands: vec![
                "ls".into(),
                "cat".into(),
                "echo".into(),
                "grep".into(),
                "pwd".into(),
                "date".into(),
                "git".into(),
                "cargo".into(),
            ],
            forbidden_paths: vec![
                "/etc".into(),
                "/proc".into(),
                "/sys".into(),
                "~/.ssh".into(),
                "~/.gnupg".into(),
                "~/.aws".into(),
            ],
            allowed_roots: vec![],
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// Phrases appended to the built-in continuation lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinuationConfig {
    #[serde(default)]
    pub completion: Vec<String>,

    #[serde(default)]
    pub continuation: Vec<String>,

    #[serde(default)]
    pub incomplete: Vec<String>,

    #[serde(default)]
    pub multi_task: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.turnloop/config.toml),
    /// then apply `TURNLOOP_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from a variable lookup (the environment in production).
    ///
    /// Recognized: `TURNLOOP_MAX_TURNS`, `TURNLOOP_MAX_TOOL_CALLS`,
    /// `TURNLOOP_TIMEOUT_MS`, `TURNLOOP_DEBUG`, `TURNLOOP_MODEL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("{key} has invalid value '{raw}'")))
        }

        if let Some(raw) = lookup("TURNLOOP_MAX_TURNS") {
            self.agentic.max_turns = parse("TURNLOOP_MAX_TURNS", &raw)?;
        }
        if let Some(raw) = lookup("TURNLOOP_MAX_TOOL_CALLS") {
            self.agentic.max_tool_calls = parse("TURNLOOP_MAX_TOOL_CALLS", &raw)?;
        }
        if let Some(raw) = lookup("TURNLOOP_TIMEOUT_MS") {
            self.agentic.timeout_ms = parse("TURNLOOP_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("TURNLOOP_DEBUG") {
            self.agentic.debug = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(model) = lookup("TURNLOOP_MODEL") {
            if !model.trim().is_empty() {
                self.chat.model = Some(model);
            }
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".turnloop")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agentic.max_turns == 0 {
            return Err(ConfigError::ValidationError("agentic.max_turns must be at least 1".into()));
        }

        if self.agentic.timeout_ms == 0 {
            return Err(ConfigError::ValidationError("agentic.timeout_ms must be > 0".into()));
        }

        if let Some(t) = self.chat.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "chat.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.history.max_messages == 0 {
            return Err(ConfigError::ValidationError("history.max_messages must be at least 1".into()));
        }

        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("tools.command_timeout_secs must be > 0".into()));
        }

        Ok(())
    }

    /// Loop budgets as the turn engine consumes them.
    pub fn turn_options(&self) -> AgenticTurnOptions {
        AgenticTurnOptions {
            max_turns: self.agentic.max_turns,
            max_tool_calls: self.agentic.max_tool_calls,
            timeout_ms: self.agentic.timeout_ms,
            debug: self.agentic.debug,
        }
    }

    /// Base chat options; the loop fills in the tool list per run.
    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            model: self.chat.model.clone(),
            temperature: self.chat.temperature,
            max_tokens: self.chat.max_tokens,
            system_prompt: self.chat.system_prompt.clone(),
            ..ChatOptions::default()
        }
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
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

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Some(rest) => dirs_home().join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
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
