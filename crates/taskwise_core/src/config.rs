//! Application configuration.
//!
//! # Responsibility
//! - Load store, model and logging settings from a TOML file.
//! - Apply `TASKWISE_*` environment overrides on top of the file.
//! - Reject unusable settings once, at startup.
//!
//! # Invariants
//! - A config that passed `validate()` has a positive model timeout and a
//!   non-empty model endpoint.
//! - A missing store path is reported when the store is opened, not by
//!   `validate()`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "TASKWISE_DB_PATH";
pub const ENV_API_KEY: &str = "TASKWISE_API_KEY";
pub const ENV_LLM_BASE_URL: &str = "TASKWISE_LLM_BASE_URL";
pub const ENV_LLM_MODEL: &str = "TASKWISE_LLM_MODEL";

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Configuration loading and validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io { path: PathBuf, message: String },
    Parse(String),
    /// No store location configured.
    MissingStorePath,
    InvalidValue { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "failed to read config `{}`: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid config file: {message}"),
            Self::MissingStorePath => write!(
                f,
                "task store is not configured; set [store] db_path or {ENV_DB_PATH}"
            ),
            Self::InvalidValue { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file shared by every client of the task collection.
    pub db_path: Option<PathBuf>,
}

/// Connection settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL; a trailing `/v1` is tolerated.
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace|debug|info|warn|error`; build default when absent.
    pub level: Option<String>,
    /// Absolute directory for rolling log files; logging is off when absent.
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Parses TOML text without touching the environment.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads `path` (or defaults when the file does not exist), applies
    /// process environment overrides and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            Self::from_toml_str(&text)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlays non-empty values returned by `lookup` for the `TASKWISE_*`
    /// variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup(ENV_DB_PATH) {
            self.store.db_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_API_KEY) {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = lookup(ENV_LLM_BASE_URL) {
            self.llm.base_url = value;
        }
        if let Some(value) = lookup(ENV_LLM_MODEL) {
            self.llm.model = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.base_url",
                message: "cannot be empty".to_string(),
            });
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.model",
                message: "cannot be empty".to_string(),
            });
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature",
                message: format!("{} is outside 0.0..=2.0", self.llm.temperature),
            });
        }
        Ok(())
    }

    /// Returns the configured store path.
    ///
    /// # Errors
    /// - `MissingStorePath` when neither file nor environment set one.
    pub fn db_path(&self) -> Result<&Path, ConfigError> {
        match self.store.db_path.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(ConfigError::MissingStorePath),
        }
    }
}
