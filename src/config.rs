//! Application configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! [http]
//! address = "0.0.0.0:3333"
//! request_timeout_ms = 30000
//! debug = false
//!
//! [exceptions]
//! ignore_codes = ["E_VALIDATION"]
//! ignore_statuses = [404]
//!
//! [logging]
//! level = "info"
//! format = "pretty"   # pretty | compact | json
//! ```
//!
//! Syntax is checked by serde; [`AppConfig::validate`] checks values and
//! reports every problem it finds, not just the first.

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub exceptions: ExceptionsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// `host:port` to listen on.
    pub address: String,
    /// Upper bound on the handle phase plus the handler. Unset means no bound.
    pub request_timeout_ms: Option<u64>,
    /// Exposes internal error messages and stacks in error bodies.
    pub debug: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:3333".to_owned(),
            request_timeout_ms: None,
            debug: false,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Errors the exception handler renders but does not log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExceptionsConfig {
    pub ignore_codes: Vec<String>,
    pub ignore_statuses: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Pretty }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl AppConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("parse error: {e}")))?;
        config.validate().map_err(|errors| {
            let joined = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            Error::Config(format!("validation failed: {joined}"))
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.http.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError {
                field: "http.address",
                message: format!("`{}` is not a host:port socket address", self.http.address),
            });
        }
        if self.http.request_timeout_ms == Some(0) {
            errors.push(ValidationError {
                field: "http.request_timeout_ms",
                message: "must be greater than zero".to_owned(),
            });
        }
        if self.logging.level.trim().is_empty() {
            errors.push(ValidationError {
                field: "logging.level",
                message: "must not be empty".to_owned(),
            });
        }
        for &status in &self.exceptions.ignore_statuses {
            if !(100..=599).contains(&status) {
                errors.push(ValidationError {
                    field: "exceptions.ignore_statuses",
                    message: format!("{status} is not an HTTP status"),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Reads, parses and validates the TOML file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<AppConfig, Error> {
    let content = fs::read_to_string(path)?;
    AppConfig::from_toml(&content)
}
