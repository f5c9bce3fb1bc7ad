//! Configuration management for RecallAI
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{RecallError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for RecallAI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote conversation service settings
    #[serde(default)]
    pub service: ServiceConfig,
    /// Session controller behavior
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote conversation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8000/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Origin of the web front end; share URLs are built against it
    #[serde(default = "default_public_origin")]
    pub public_origin: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_public_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("recallai/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            public_origin: default_public_origin(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

/// Session controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long the end-success state is held before completion (ms)
    #[serde(default = "default_end_display_delay_ms")]
    pub end_display_delay_ms: u64,

    /// Characters of the first message kept in a derived title
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Appended to a derived title when the text was cut
    #[serde(default = "default_title_ellipsis")]
    pub title_ellipsis: String,

    /// Assistant text appended when a send fails
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

fn default_end_display_delay_ms() -> u64 {
    2000
}

fn default_title_max_chars() -> usize {
    50
}

fn default_title_ellipsis() -> String {
    "...".to_string()
}

fn default_fallback_reply() -> String {
    "Sorry, I encountered an error. Please try again.".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            end_display_delay_ms: default_end_display_delay_ms(),
            title_max_chars: default_title_max_chars(),
            title_ellipsis: default_title_ellipsis(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,

    /// Also append logs to this file
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RecallError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RecallError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("RECALLAI_BASE_URL") {
            tracing::debug!(base_url = %base_url, "Env override: RECALLAI_BASE_URL");
            self.service.base_url = base_url;
        }

        if let Ok(origin) = std::env::var("RECALLAI_PUBLIC_ORIGIN") {
            tracing::debug!(origin = %origin, "Env override: RECALLAI_PUBLIC_ORIGIN");
            self.service.public_origin = origin;
        }

        if let Ok(timeout) = std::env::var("RECALLAI_TIMEOUT_SECONDS") {
            match timeout.parse::<u64>() {
                Ok(v) => self.service.timeout_seconds = v,
                Err(_) => tracing::warn!("Invalid RECALLAI_TIMEOUT_SECONDS: {}", timeout),
            }
        }

        if let Ok(delay) = std::env::var("RECALLAI_END_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(v) => self.session.end_display_delay_ms = v,
                Err(_) => tracing::warn!("Invalid RECALLAI_END_DELAY_MS: {}", delay),
            }
        }

        if let Ok(level) = std::env::var("RECALLAI_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("RECALLAI_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => {
                    self.logging.json_format = v;
                    tracing::debug!(json_logs = v, "Env override: RECALLAI_JSON_LOGS");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for RECALLAI_JSON_LOGS: {}", json_logs);
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            self.service.base_url = base_url.clone();
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let base_url = self.service.base_url.trim();
        if base_url.is_empty() {
            return Err(RecallError::Config("base_url cannot be empty".to_string()).into());
        }

        match url::Url::parse(base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(RecallError::Config(format!(
                    "Invalid base_url scheme: {}. Must be http or https",
                    parsed.scheme()
                ))
                .into());
            }
            Err(e) => {
                return Err(
                    RecallError::Config(format!("Invalid base_url {}: {}", base_url, e)).into(),
                );
            }
        }

        if self.service.timeout_seconds == 0 {
            return Err(RecallError::Config(
                "timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.session.title_max_chars == 0 {
            return Err(RecallError::Config(
                "title_max_chars must be greater than 0".to_string(),
            )
            .into());
        }

        if self.session.fallback_reply.trim().is_empty() {
            return Err(
                RecallError::Config("fallback_reply cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}
