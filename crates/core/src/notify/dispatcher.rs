use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Announcement, Announcer};
use crate::metrics;
use crate::patient::PatientDirectory;

/// What the engine knows at commit time; the worker adds the patient name.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceRequest {
    pub ticket_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub queue_number: u32,
    pub queue_label: String,
    pub patient_ref: String,
    pub recall_count: u32,
}

/// Handle for queueing announcements.
///
/// Cheaply cloneable. Queueing never waits: when the buffer is full or the
/// worker is gone the request is dropped with a warning.
#[derive(Clone)]
pub struct NotificationHandle {
    tx: mpsc::Sender<AnnounceRequest>,
}

impl NotificationHandle {
    pub fn new(tx: mpsc::Sender<AnnounceRequest>) -> Self {
        Self { tx }
    }

    /// Queue an announcement. Returns false if it was dropped.
    pub fn announce(&self, request: AnnounceRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping announcement: {}", e);
                metrics::NOTIFICATIONS_TOTAL
                    .with_label_values(&["dropped"])
                    .inc();
                false
            }
        }
    }
}

/// Background task delivering queued announcements one at a time.
pub struct DispatchWorker {
    rx: mpsc::Receiver<AnnounceRequest>,
    announcer: Arc<dyn Announcer>,
    directory: Option<Arc<dyn PatientDirectory>>,
    timeout: Duration,
}

impl DispatchWorker {
    pub fn new(
        rx: mpsc::Receiver<AnnounceRequest>,
        announcer: Arc<dyn Announcer>,
        directory: Option<Arc<dyn PatientDirectory>>,
        timeout: Duration,
    ) -> Self {
        Self {
            rx,
            announcer,
            directory,
            timeout,
        }
    }

    /// Run until every handle has been dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Notification dispatcher started ({})", self.announcer.name());

        while let Some(request) = self.rx.recv().await {
            self.deliver(request).await;
        }

        info!("Notification dispatcher shutting down");
    }

    async fn deliver(&self, request: AnnounceRequest) {
        let patient_display_name = self.resolve_name(&request.patient_ref).await;

        let announcement = Announcement {
            ticket_id: request.ticket_id,
            channel_id: request.channel_id,
            channel_name: request.channel_name,
            queue_number: request.queue_number,
            queue_label: request.queue_label,
            patient_display_name,
            recall_count: request.recall_count,
        };

        let outcome =
            tokio::time::timeout(self.timeout, self.announcer.announce(&announcement)).await;

        let result = match outcome {
            Ok(Ok(())) => {
                debug!("Announced {}", announcement.queue_label);
                "delivered"
            }
            Ok(Err(e)) => {
                warn!(
                    "Announcer {} failed for {}: {}",
                    self.announcer.name(),
                    announcement.queue_label,
                    e
                );
                "failed"
            }
            Err(_) => {
                warn!(
                    "Announcer {} timed out for {}",
                    self.announcer.name(),
                    announcement.queue_label
                );
                "timeout"
            }
        };
        metrics::NOTIFICATIONS_TOTAL
            .with_label_values(&[result])
            .inc();
    }

    async fn resolve_name(&self, patient_ref: &str) -> Option<String> {
        let directory = self.directory.as_ref()?;
        match tokio::time::timeout(self.timeout, directory.resolve(patient_ref)).await {
            Ok(Ok(info)) => Some(info.display_name),
            Ok(Err(e)) => {
                warn!("Patient lookup failed for {}: {}", patient_ref, e);
                None
            }
            Err(_) => {
                warn!("Patient lookup timed out for {}", patient_ref);
                None
            }
        }
    }
}

/// Create a notification system.
///
/// Returns the handle to give the engine and the worker to spawn with
/// `tokio::spawn(worker.run())`.
pub fn create_notification_system(
    announcer: Arc<dyn Announcer>,
    directory: Option<Arc<dyn PatientDirectory>>,
    buffer_size: usize,
    timeout: Duration,
) -> (NotificationHandle, DispatchWorker) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let handle = NotificationHandle::new(tx);
    let worker = DispatchWorker::new(rx, announcer, directory, timeout);
    (handle, worker)
}
