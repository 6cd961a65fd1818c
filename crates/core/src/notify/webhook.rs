//! Announcer that POSTs announcements to an HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{AnnounceError, Announcement, Announcer, WebhookConfig};

pub struct WebhookAnnouncer {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookAnnouncer {
    pub fn new(config: &WebhookConfig) -> Result<Self, AnnounceError> {
        if config.url.is_empty() {
            return Err(AnnounceError::NotConfigured(
                "webhook url is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl Announcer for WebhookAnnouncer {
    async fn announce(&self, announcement: &Announcement) -> Result<(), AnnounceError> {
        debug!("Webhook announce {} -> {}", announcement.queue_label, self.url);

        let mut request = self.client.post(&self.url).json(announcement);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnnounceError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
