use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::notify::NotifierBackend;

/// Largest real-world UTC offset, in minutes (UTC+14).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Engine numbers are in range
/// - Webhook notifier has a URL
/// - Patient directory URL is http(s)
/// - Channel seeds are well-formed and unique
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let engine = &config.engine;
    if !engine.default_service_minutes.is_finite() || engine.default_service_minutes <= 0.0 {
        return Err(invalid("engine.default_service_minutes must be positive"));
    }
    if engine.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(invalid("engine.utc_offset_minutes must be within +/-840"));
    }
    if engine.event_buffer == 0 {
        return Err(invalid("engine.event_buffer cannot be 0"));
    }
    if engine.store_retry.max_attempts == 0 {
        return Err(invalid("engine.store_retry.max_attempts must be at least 1"));
    }
    if engine.store_retry.initial_backoff_ms > engine.store_retry.max_backoff_ms {
        return Err(invalid(
            "engine.store_retry.initial_backoff_ms cannot exceed max_backoff_ms",
        ));
    }

    if config.notifier.buffer_size == 0 {
        return Err(invalid("notifier.buffer_size cannot be 0"));
    }
    if config.notifier.backend == NotifierBackend::Webhook {
        match &config.notifier.webhook {
            Some(webhook) if !webhook.url.is_empty() => {}
            _ => {
                return Err(invalid(
                    "notifier.webhook.url must be set when notifier.backend = \"webhook\"",
                ))
            }
        }
    }

    if let Some(url) = &config.patients.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("patients.base_url must be an http(s) URL"));
        }
    }

    let mut seen = HashSet::new();
    for channel in &config.channels {
        channel
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("channels: {}", e)))?;
        if !seen.insert(channel.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "channels: duplicate id {:?}",
                channel.id
            )));
        }
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
