//! Announcement delivery.
//!
//! The engine never talks to an announcer directly: it queues an
//! [`AnnounceRequest`] on a [`NotificationHandle`] and moves on. A
//! [`DispatchWorker`] resolves the patient's display name and hands the
//! finished [`Announcement`] to the configured [`Announcer`].

mod config;
mod dispatcher;
mod log;
mod webhook;

pub use self::config::{NotifierBackend, NotifierConfig, WebhookConfig};
pub use self::dispatcher::{
    create_notification_system, AnnounceRequest, DispatchWorker, NotificationHandle,
};
pub use self::log::LogAnnouncer;
pub use self::webhook::WebhookAnnouncer;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from announcement sinks.
#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("announcer rejected announcement: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("announcer not configured: {0}")]
    NotConfigured(String),
}

/// A structured "please come to the counter" event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Announcement {
    pub ticket_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub queue_number: u32,
    /// Human label such as `UMU-007`.
    pub queue_label: String,
    /// Absent when no directory is configured or the lookup failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_display_name: Option<String>,
    /// 0 on the first call, incremented on each recall.
    pub recall_count: u32,
}

/// Sink that renders announcements (voice, display board, webhook, ...).
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, announcement: &Announcement) -> Result<(), AnnounceError>;

    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;
}

/// Build the announcer selected by config.
pub fn create_announcer(config: &NotifierConfig) -> Result<Arc<dyn Announcer>, AnnounceError> {
    match config.backend {
        NotifierBackend::Log => Ok(Arc::new(LogAnnouncer::new())),
        NotifierBackend::Webhook => {
            let webhook = config.webhook.as_ref().ok_or_else(|| {
                AnnounceError::NotConfigured(
                    "[notifier.webhook] must be set when backend = \"webhook\"".to_string(),
                )
            })?;
            Ok(Arc::new(WebhookAnnouncer::new(webhook)?))
        }
    }
}
