//! Announcer that records what it was asked to announce.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::notify::{AnnounceError, Announcement, Announcer};

/// Records delivered announcements; can be told to fail or stall.
#[derive(Debug, Default)]
pub struct RecordingAnnouncer {
    announcements: Mutex<Vec<Announcement>>,
    failures_left: Mutex<usize>,
    delay: Option<Duration>,
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before recording each announcement.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail the next `n` announcements.
    pub fn fail_next(&self, n: usize) {
        *self.failures_left.lock().unwrap() = n;
    }

    /// Successfully delivered announcements, oldest first.
    pub fn announcements(&self) -> Vec<Announcement> {
        self.announcements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(&self, announcement: &Announcement) -> Result<(), AnnounceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AnnounceError::Rejected {
                    status: 500,
                    message: "mock failure".to_string(),
                });
            }
        }

        self.announcements
            .lock()
            .unwrap()
            .push(announcement.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
