//! Test doubles and fixtures.
//!
//! Mock implementations of the collaborator traits plus a store wrapper
//! that injects transient failures, so engine behaviour can be exercised
//! without a patient directory, display hardware or a failing disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use antrian_core::testing::{fixtures, RecordingAnnouncer};
//!
//! let announcer = Arc::new(RecordingAnnouncer::new());
//! let (engine, worker) = fixtures::engine_with_announcer(announcer.clone());
//! tokio::spawn(worker.run());
//!
//! fixtures::register(&engine, "umum", false).await;
//! fixtures::enroll(&engine, "umum", "RM-0001").await;
//! engine.call_next("umum").await?;
//! ```

mod flaky_store;
mod mock_patient_directory;
mod recording_announcer;

pub use flaky_store::FlakyTicketStore;
pub use mock_patient_directory::MockPatientDirectory;
pub use recording_announcer::RecordingAnnouncer;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use crate::channel::{Channel, NewChannel, SqliteChannelStore};
    use crate::engine::{EngineConfig, EnrollRequest, QueueEngine, StoreRetryConfig};
    use crate::notify::{create_notification_system, Announcer, DispatchWorker};
    use crate::ticket::{PriorityTier, SqliteTicketStore, Ticket, TicketStatus, TicketStore};

    /// Engine config with millisecond backoff so retry tests stay fast.
    pub fn engine_config() -> EngineConfig {
        EngineConfig {
            store_retry: StoreRetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
            ..Default::default()
        }
    }

    /// Engine over in-memory stores, without notifications.
    pub fn engine() -> QueueEngine {
        engine_with(engine_config(), in_memory_tickets())
    }

    /// Engine over the given ticket store, without notifications.
    pub fn engine_with(config: EngineConfig, tickets: Arc<dyn TicketStore>) -> QueueEngine {
        QueueEngine::new(config, tickets, in_memory_channels(), None)
    }

    /// Engine wired to `announcer`; spawn the returned worker to deliver.
    pub fn engine_with_announcer(announcer: Arc<dyn Announcer>) -> (QueueEngine, DispatchWorker) {
        let (handle, worker) =
            create_notification_system(announcer, None, 64, Duration::from_secs(1));
        let engine = QueueEngine::new(
            engine_config(),
            in_memory_tickets(),
            in_memory_channels(),
            Some(handle),
        );
        (engine, worker)
    }

    pub fn in_memory_tickets() -> Arc<dyn TicketStore> {
        Arc::new(SqliteTicketStore::in_memory().expect("in-memory ticket store"))
    }

    fn in_memory_channels() -> Arc<SqliteChannelStore> {
        Arc::new(SqliteChannelStore::in_memory().expect("in-memory channel store"))
    }

    /// Register a channel whose code is the upper-cased ID (truncated to 6).
    pub async fn register(engine: &QueueEngine, id: &str, auto_call: bool) -> Channel {
        let code: String = id.to_ascii_uppercase().chars().take(6).collect();
        engine
            .register_channel(
                NewChannel::new(id, code, format!("Poli {}", id)).with_auto_call(auto_call),
            )
            .await
            .expect("register channel")
    }

    /// Enroll a normal-tier ticket.
    pub async fn enroll(engine: &QueueEngine, channel_id: &str, patient_ref: &str) -> Ticket {
        enroll_tier(engine, channel_id, patient_ref, PriorityTier::Normal).await
    }

    pub async fn enroll_tier(
        engine: &QueueEngine,
        channel_id: &str,
        patient_ref: &str,
        tier: PriorityTier,
    ) -> Ticket {
        engine
            .enroll(EnrollRequest::new(channel_id, patient_ref).with_tier(tier))
            .await
            .expect("enroll")
    }

    /// Poll until the ticket reaches `status` (up to two seconds).
    pub async fn wait_for_status(engine: &QueueEngine, ticket_id: &str, status: TicketStatus) -> bool {
        for _ in 0..100 {
            if let Ok(ticket) = engine.ticket(ticket_id).await {
                if ticket.status == status {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// In-memory ticket for pure scheduling tests.
    pub fn ticket(
        id: &str,
        tier: PriorityTier,
        status: TicketStatus,
        enqueued_at: DateTime<Utc>,
    ) -> Ticket {
        Ticket {
            id: id.to_string(),
            channel_id: "umum".to_string(),
            queue_number: 1,
            service_date: enqueued_at.date_naive(),
            patient_ref: format!("RM-{}", id),
            priority_tier: tier,
            status,
            enqueued_at,
            called_at: None,
            service_started_at: None,
            completed_at: None,
            cancelled_at: None,
            skipped_at: None,
            skip_count: 0,
            recall_count: 0,
            estimated_wait_minutes: None,
            notes: None,
            updated_at: enqueued_at,
        }
    }
}
