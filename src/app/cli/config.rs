//! TOML configuration loading
//!
//! Settings are resolved in layers: built-in defaults, then the config file
//! (explicit `--config-file` or the default location), then environment
//! variables, then command-line flags. The result is validated once.

use crate::app::cli::args::Args;
use crate::broker::transport::QueueDeclaration;
use crate::broker::{AmqpConnector, BackoffPolicy};
use crate::core::error_handling::ContextualError;
use crate::core::logging::{LogFormat, LoggingOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};

pub const ENV_BROKER_URL: &str = "RABBITMQ_URL";
pub const ENV_BACKEND: &str = "COURIER_BACKEND";
pub const ENV_LOG_LEVEL: &str = "COURIER_LOG_LEVEL";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{message}")]
    Read { message: String },

    #[error("{message}")]
    Parse { message: String },

    #[error("{message}")]
    Invalid { message: String },
}

impl ConfigError {
    fn read(path: &Path, cause: impl std::fmt::Display) -> Self {
        ConfigError::Read {
            message: format!("Error reading configuration file {}: {}", path.display(), cause),
        }
    }

    fn parse(path: &Path, cause: impl std::fmt::Display) -> Self {
        ConfigError::Parse {
            message: format!("Error parsing configuration file {}: {}", path.display(), cause),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            message: message.into(),
        }
    }

    fn message(&self) -> &str {
        match self {
            ConfigError::Read { message }
            | ConfigError::Parse { message }
            | ConfigError::Invalid { message } => message,
        }
    }
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<&str> {
        Some(self.message())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueBackend {
    /// In-process queue, lost on exit
    #[default]
    Memory,
    /// AMQP broker with durable queues
    Durable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub backend: QueueBackend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub url: String,
    pub heartbeat_secs: u16,
    pub connection_timeout_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub message_ttl_ms: u64,
    pub probe_attempts: usize,
    pub probe_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            heartbeat_secs: 60,
            connection_timeout_ms: 10_000,
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            message_ttl_ms: 86_400_000,
            probe_attempts: 5,
            probe_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
            color: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// `<config dir>/Courier/courier.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Courier").join("courier.toml"))
    }

    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::parse(origin, e))
    }

    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::read(path, e))?;
        Self::from_toml_str(&contents, path)
    }

    /// Load the explicit file, else the default file if present, else defaults
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::read(path, "file does not exist"));
            }
            return Self::load_file(path).await;
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_file(&path).await,
            _ => Ok(Self::default()),
        }
    }

    /// Full resolution for the binary: file, process environment, flags, validation
    pub async fn resolve(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Self::load(args.config_file.as_deref()).await?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_BROKER_URL).filter(|v| !v.is_empty()) {
            self.broker.url = url;
        }
        if let Some(backend) = lookup(ENV_BACKEND).filter(|v| !v.is_empty()) {
            self.queue.backend = QueueBackend::from_str(&backend.to_lowercase()).map_err(|_| {
                ConfigError::invalid(format!(
                    "{ENV_BACKEND} must be 'memory' or 'durable', got '{backend}'"
                ))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(backend) = args.backend {
            self.queue.backend = backend;
        }
        if let Some(url) = &args.broker_url {
            self.broker.url = url.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &args.log_format {
            self.logging.format = format.clone();
        }
        if let Some(file) = &args.log_file {
            // "none" and "-" send logs back to the terminal
            let disabled = file
                .to_str()
                .is_some_and(|f| f.eq_ignore_ascii_case("none") || f == "-");
            self.logging.file = if disabled { None } else { Some(file.clone()) };
        }
        if args.no_color {
            self.logging.color = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let broker = &self.broker;
        if broker.base_delay_ms == 0 {
            return Err(ConfigError::invalid("broker.base_delay_ms must be greater than 0"));
        }
        if broker.max_delay_ms < broker.base_delay_ms {
            return Err(ConfigError::invalid(format!(
                "broker.max_delay_ms ({}) must not be below broker.base_delay_ms ({})",
                broker.max_delay_ms, broker.base_delay_ms
            )));
        }
        if broker.probe_attempts == 0 {
            return Err(ConfigError::invalid("broker.probe_attempts must be at least 1"));
        }
        if broker.message_ttl_ms > u64::from(u32::MAX) {
            return Err(ConfigError::invalid(format!(
                "broker.message_ttl_ms must not exceed {}",
                u32::MAX
            )));
        }
        if !(broker.url.starts_with("amqp://") || broker.url.starts_with("amqps://")) {
            return Err(ConfigError::invalid(format!(
                "broker.url must start with amqp:// or amqps://, got '{}'",
                crate::broker::amqp::redact_credentials(&broker.url)
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }
        self.log_format()?;
        Ok(())
    }

    fn log_format(&self) -> Result<LogFormat, ConfigError> {
        LogFormat::from_str(&self.logging.format).map_err(|_| {
            ConfigError::invalid(format!(
                "logging.format must be text, ext or json, got '{}'",
                self.logging.format
            ))
        })
    }

    pub fn logging_options(&self) -> Result<LoggingOptions, ConfigError> {
        Ok(LoggingOptions {
            level: self.logging.level.to_lowercase(),
            format: self.log_format()?,
            file: self.logging.file.clone(),
            color: self.logging.color,
        })
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.broker.base_delay_ms),
            max_delay: Duration::from_millis(self.broker.max_delay_ms),
            max_retries: self.broker.max_retries,
        }
    }

    pub fn queue_declaration(&self) -> QueueDeclaration {
        QueueDeclaration {
            message_ttl: Duration::from_millis(self.broker.message_ttl_ms),
            ..QueueDeclaration::default()
        }
    }

    pub fn connector(&self) -> AmqpConnector {
        AmqpConnector::new(self.broker.url.clone())
            .with_heartbeat(self.broker.heartbeat_secs)
            .with_connection_timeout(self.broker.connection_timeout_ms)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.broker.probe_delay_ms)
    }
}
