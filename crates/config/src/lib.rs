//! Configuration loading, validation, and management for ClawLoop.
//!
//! Loads configuration from `~/.clawloop/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use clawloop_core::agent::{AgentConfig, default_summary_directive};
use clawloop_core::provider::GenerationOptions;
use clawloop_core::tool::ExecutionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.clawloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent behavior
    #[serde(default)]
    pub agent: AgentSection,

    /// Tool execution policy
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Reasoning iterations before the loop is forced to summarize
    #[serde(default = "default_max_iters")]
    pub max_iters: u32,

    #[serde(default = "default_summary_directive")]
    pub summary_directive: String,
}

fn default_name() -> String {
    "assistant".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_iters() -> u32 {
    10
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            system_prompt: default_system_prompt(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            max_iters: default_max_iters(),
            summary_directive: default_summary_directive(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-attempt tool timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry delay
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Run one batch of tool calls concurrently
    #[serde(default = "default_true")]
    pub concurrent: bool,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    250
}
fn default_max_backoff_ms() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            concurrent: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.clawloop/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `CLAWLOOP_MODEL`
    /// - `CLAWLOOP_MAX_ITERS`
    /// - `CLAWLOOP_SYSTEM_PROMPT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
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

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(model) = std::env::var("CLAWLOOP_MODEL") {
            self.agent.model = model;
        }
        if let Ok(raw) = std::env::var("CLAWLOOP_MAX_ITERS") {
            self.agent.max_iters = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("CLAWLOOP_MAX_ITERS is not a number: {raw}"))
            })?;
        }
        if let Ok(prompt) = std::env::var("CLAWLOOP_SYSTEM_PROMPT") {
            self.agent.system_prompt = prompt;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".clawloop")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("agent.model must not be empty".into()));
        }

        if self.execution.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "execution.timeout_secs must be > 0".into(),
            ));
        }

        if self.execution.backoff_ms > self.execution.max_backoff_ms {
            return Err(ConfigError::ValidationError(
                "execution.backoff_ms must not exceed execution.max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Agent settings as the core configuration type.
    pub fn to_agent_config(&self) -> AgentConfig {
        let mut options = GenerationOptions::new(&self.agent.model);
        options.temperature = self.agent.temperature;
        options.max_tokens = self.agent.max_tokens;

        AgentConfig {
            name: self.agent.name.clone(),
            system_prompt: self.agent.system_prompt.clone(),
            options,
            max_iterations: self.agent.max_iters,
            summary_directive: self.agent.summary_directive.clone(),
        }
    }

    pub fn to_execution_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            timeout: Duration::from_secs(self.execution.timeout_secs),
            max_retries: self.execution.max_retries,
            backoff: Duration::from_millis(self.execution.backoff_ms),
            max_backoff: Duration::from_millis(self.execution.max_backoff_ms),
            concurrent: self.execution.concurrent,
        }
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
