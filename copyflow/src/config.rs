//! Configuration types for generation and sessions.
//!
//! Configuration is loaded from a JSON file where every field is optional,
//! then overridden from the process environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::StageId;

/// Environment variable overriding the model id.
pub const ENV_MODEL: &str = "COPYFLOW_MODEL";
/// Environment variable overriding the default temperature.
pub const ENV_TEMPERATURE: &str = "COPYFLOW_TEMPERATURE";
/// Environment variable overriding the output token limit.
pub const ENV_MAX_OUTPUT_TOKENS: &str = "COPYFLOW_MAX_OUTPUT_TOKENS";
/// Environment variable overriding the REST endpoint.
pub const ENV_ENDPOINT: &str = "COPYFLOW_ENDPOINT";
/// Environment variable overriding the state file location.
pub const ENV_STATE_PATH: &str = "COPYFLOW_STATE_PATH";

/// Longest accepted request timeout, in seconds.
pub const MAX_TIMEOUT_SECONDS: f64 = 3600.0;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// The config file.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("Invalid config {path}: {message}")]
    Parse {
        /// The config file.
        path: String,
        /// Parser message.
        message: String,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Parameters of every call to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Sampling temperature used when a stage has no specific one.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum number of output tokens.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// REST base URL of the service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

fn default_model_id() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_seconds() -> f64 {
    120.0
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl GenerationConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model id.
    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Sets the default temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the output token limit.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Sets the REST endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Gets timeout as Duration, clamped to `0..=MAX_TIMEOUT_SECONDS`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        let max = Duration::from_secs_f64(MAX_TIMEOUT_SECONDS);
        Duration::try_from_secs_f64(self.timeout_seconds.max(0.0)).map_or(max, |d| d.min(max))
    }

    /// Checks values that serde accepts but a client cannot use.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=MAX_TIMEOUT_SECONDS).contains(&self.timeout_seconds) {
            return Err(format!(
                "generation.timeout_seconds must be between 0 and {MAX_TIMEOUT_SECONDS}, got {}",
                self.timeout_seconds
            ));
        }
        Ok(())
    }
}

/// Top-level configuration of a workflow session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyflowConfig {
    /// Generation parameters.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Where the workflow state is persisted. `None` keeps it in memory.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Per-stage temperature overrides.
    #[serde(default)]
    pub stage_temperatures: BTreeMap<StageId, f64>,
}

impl CopyflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        config.generation.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = non_empty(lookup(ENV_MODEL)) {
            self.generation.model_id = model;
        }
        if let Some(raw) = non_empty(lookup(ENV_TEMPERATURE)) {
            self.generation.temperature = parse_env(ENV_TEMPERATURE, raw)?;
        }
        if let Some(raw) = non_empty(lookup(ENV_MAX_OUTPUT_TOKENS)) {
            self.generation.max_output_tokens = parse_env(ENV_MAX_OUTPUT_TOKENS, raw)?;
        }
        if let Some(endpoint) = non_empty(lookup(ENV_ENDPOINT)) {
            self.generation.endpoint = endpoint;
        }
        if let Some(path) = non_empty(lookup(ENV_STATE_PATH)) {
            self.state_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Sets the generation parameters.
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the state file location.
    #[must_use]
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Overrides the temperature of one stage.
    #[must_use]
    pub fn with_stage_temperature(mut self, stage: StageId, temperature: f64) -> Self {
        self.stage_temperatures.insert(stage, temperature);
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value: raw })
}
