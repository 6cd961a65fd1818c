use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::autocall::AutoCallConfig;
use crate::channel::NewChannel;
use crate::engine::EngineConfig;
use crate::notify::{NotifierBackend, NotifierConfig};
use crate::patient::PatientsConfig;

/// Root configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub auto_call: AutoCallConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub patients: PatientsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Channels registered at startup if missing.
    #[serde(default)]
    pub channels: Vec<NewChannel>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("antrian.db")
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub auto_call: AutoCallConfig,
    pub notifier: SanitizedNotifierConfig,
    pub patients: PatientsConfig,
    pub logging: LoggingConfig,
    pub channels: Vec<NewChannel>,
}

/// Sanitized notifier config (webhook token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    pub backend: NotifierBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<SanitizedWebhookConfig>,
    pub buffer_size: usize,
    pub announce_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWebhookConfig {
    pub url: String,
    pub token_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            engine: config.engine.clone(),
            auto_call: config.auto_call.clone(),
            notifier: SanitizedNotifierConfig {
                backend: config.notifier.backend,
                webhook: config
                    .notifier
                    .webhook
                    .as_ref()
                    .map(|w| SanitizedWebhookConfig {
                        url: w.url.clone(),
                        token_configured: w.token.as_deref().is_some_and(|t| !t.is_empty()),
                        timeout_secs: w.timeout_secs,
                    }),
                buffer_size: config.notifier.buffer_size,
                announce_timeout_ms: config.notifier.announce_timeout_ms,
            },
            patients: config.patients.clone(),
            logging: config.logging.clone(),
            channels: config.channels.clone(),
        }
    }
}
