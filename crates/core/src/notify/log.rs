//! Announcer that only writes to the log.

use async_trait::async_trait;
use tracing::info;

use super::{AnnounceError, Announcement, Announcer};

/// Logs each announcement at `info`. Default when no display hardware is wired up.
#[derive(Debug, Default, Clone)]
pub struct LogAnnouncer;

impl LogAnnouncer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn announce(&self, announcement: &Announcement) -> Result<(), AnnounceError> {
        info!(
            channel = %announcement.channel_id,
            ticket_id = %announcement.ticket_id,
            recall_count = announcement.recall_count,
            "Calling {} {} to {}",
            announcement.queue_label,
            announcement.patient_display_name.as_deref().unwrap_or(""),
            announcement.channel_name
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
