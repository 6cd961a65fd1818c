//! Notifier configuration.

use serde::{Deserialize, Serialize};

/// Announcement delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub backend: NotifierBackend,

    /// Required when `backend = "webhook"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,

    /// Pending announcements held before new ones are dropped.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Upper bound for one patient lookup plus one announce call.
    #[serde(default = "default_announce_timeout")]
    pub announce_timeout_ms: u64,
}

/// Available announcement sinks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifierBackend {
    /// Write announcements to the log.
    #[default]
    Log,
    /// POST announcements as JSON to a URL.
    Webhook,
}

/// Webhook announcer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Endpoint receiving `POST` requests with the announcement as JSON.
    pub url: String,
    /// Sent as a bearer token when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_buffer_size() -> usize {
    64
}

fn default_announce_timeout() -> u64 {
    3000
}

fn default_webhook_timeout() -> u64 {
    5
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            backend: NotifierBackend::Log,
            webhook: None,
            buffer_size: default_buffer_size(),
            announce_timeout_ms: default_announce_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let config: NotifierConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend, NotifierBackend::Log);
        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.announce_timeout_ms, 3000);
    }

    #[test]
    fn test_deserialize_webhook() {
        let toml = r#"
            backend = "webhook"

            [webhook]
            url = "http://display.local/announce"
            token = "s3cret"
        "#;
        let config: NotifierConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.backend, NotifierBackend::Webhook);
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.url, "http://display.local/announce");
        assert_eq!(webhook.token.as_deref(), Some("s3cret"));
        assert_eq!(webhook.timeout_secs, 5);
    }
}
