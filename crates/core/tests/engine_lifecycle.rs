//! Queue engine integration tests.
//!
//! These tests drive the engine end to end over an on-disk SQLite store:
//! enroll -> call_next -> begin_service -> complete, plus skip, recall,
//! cancel, concurrency guarantees, retries, announcements and auto-call.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use antrian_core::{
    testing::{fixtures, FlakyTicketStore, RecordingAnnouncer},
    ticket::CreateTicketRequest,
    AutoCaller, ChannelStore, EngineConfig, EngineError, EnrollRequest, NewChannel,
    OperatingStatus, PriorityTier, QueueEngine, QueueEvent, SkipPolicy, SqliteChannelStore,
    SqliteTicketStore, TicketFilter, TicketStatus, TicketStore,
};

/// Engine over a temporary on-disk database with one channel, `umum`.
struct TestHarness {
    engine: Arc<QueueEngine>,
    tickets: Arc<SqliteTicketStore>,
    _temp_dir: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_config(fixtures::engine_config()).await
    }

    async fn with_config(config: EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("antrian.db");

        let tickets =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));
        let channels: Arc<dyn ChannelStore> =
            Arc::new(SqliteChannelStore::new(&db_path).expect("Failed to create channel store"));

        let engine = Arc::new(QueueEngine::new(
            config,
            tickets.clone(),
            channels,
            None,
        ));
        fixtures::register(&engine, "umum", false).await;

        Self {
            engine,
            tickets,
            _temp_dir: temp_dir,
        }
    }

    async fn enroll(&self, patient: &str, tier: PriorityTier) -> antrian_core::Ticket {
        fixtures::enroll_tier(&self.engine, "umum", patient, tier).await
    }

    /// Call the next ticket and complete it, returning its patient ref.
    async fn serve_next(&self) -> String {
        let called = self.engine.call_next("umum").await.expect("call_next");
        self.engine.complete(&called.id).await.expect("complete");
        called.patient_ref
    }

    fn active_count(&self) -> usize {
        self.tickets
            .list(
                &TicketFilter::new()
                    .with_channel("umum")
                    .with_statuses(&[TicketStatus::Called, TicketStatus::InService]),
            )
            .expect("list")
            .len()
    }
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_full_lifecycle() {
    let h = TestHarness::new().await;
    let ticket = h.enroll("RM-001", PriorityTier::Normal).await;
    assert_eq!(ticket.status, TicketStatus::Waiting);
    assert_eq!(ticket.queue_number, 1);

    let called = h.engine.call_next("umum").await.unwrap();
    assert_eq!(called.id, ticket.id);
    assert_eq!(called.status, TicketStatus::Called);

    let serving = h.engine.begin_service(&ticket.id).await.unwrap();
    assert_eq!(serving.status, TicketStatus::InService);
    assert!(serving.service_started_at.is_some());

    let done = h.engine.complete(&ticket.id).await.unwrap();
    assert_eq!(done.status, TicketStatus::Completed);
    assert!(done.completed_at.is_some());

    let view = h.engine.channel_view("umum").await.unwrap();
    assert!(view.current_ticket.is_none());
    assert_eq!(view.served_count, 1);
    assert_eq!(view.waiting_count, 0);
}

#[tokio::test]
async fn test_channel_view_counts_and_next() {
    let h = TestHarness::new().await;
    h.enroll("RM-001", PriorityTier::Normal).await;
    let urgent = h.enroll("RM-002", PriorityTier::Urgent).await;
    h.enroll("RM-003", PriorityTier::Normal).await;

    let view = h.engine.channel_view("umum").await.unwrap();
    assert_eq!(view.waiting_count, 3);
    assert_eq!(view.next_ticket.as_ref().unwrap().id, urgent.id);
    assert_eq!(view.average_service_minutes, 10.0);

    let called = h.engine.call_next("umum").await.unwrap();
    let view = h.engine.channel_view("umum").await.unwrap();
    assert_eq!(view.current_ticket.unwrap().id, called.id);
    assert_eq!(view.waiting_count, 2);
}

#[tokio::test]
async fn test_queue_wait_estimates() {
    let h = TestHarness::new().await;
    for patient in ["RM-001", "RM-002", "RM-003"] {
        h.enroll(patient, PriorityTier::Normal).await;
    }

    let queue = h.engine.queue("umum").await.unwrap();
    let waits: Vec<Option<u32>> = queue.iter().map(|t| t.estimated_wait_minutes).collect();
    assert_eq!(waits, vec![Some(0), Some(10), Some(20)]);

    // With someone in service everyone waits one more slot.
    h.engine.call_next("umum").await.unwrap();
    let queue = h.engine.queue("umum").await.unwrap();
    let waits: Vec<Option<u32>> = queue.iter().map(|t| t.estimated_wait_minutes).collect();
    assert_eq!(waits, vec![Some(10), Some(20)]);
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_urgent_called_before_earlier_normal() {
    let h = TestHarness::new().await;
    h.enroll("T1", PriorityTier::Normal).await;
    let t2 = h.enroll("T2", PriorityTier::Urgent).await;

    let called = h.engine.call_next("umum").await.unwrap();
    assert_eq!(called.id, t2.id);
}

#[tokio::test]
async fn test_call_on_empty_queue() {
    let h = TestHarness::new().await;
    let err = h.engine.call_next("umum").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::QueueEmpty {
            channel_id: "umum".to_string()
        }
    );

    let view = h.engine.channel_view("umum").await.unwrap();
    assert!(view.current_ticket.is_none());
}

#[tokio::test]
async fn test_second_call_while_serving_is_busy() {
    let h = TestHarness::new().await;
    let t1 = h.enroll("T1", PriorityTier::Normal).await;
    h.enroll("T2", PriorityTier::Normal).await;

    let called = h.engine.call_next("umum").await.unwrap();
    assert_eq!(called.id, t1.id);

    let err = h.engine.call_next("umum").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::ChannelBusy {
            channel_id: "umum".to_string(),
            current_ticket_id: t1.id.clone(),
        }
    );
}

#[tokio::test]
async fn test_skipped_ticket_goes_behind_later_arrival() {
    let h = TestHarness::new().await;
    let t1 = h.enroll("T1", PriorityTier::Normal).await;
    let t3 = h.enroll("T3", PriorityTier::Normal).await;

    let called = h.engine.call_next("umum").await.unwrap();
    assert_eq!(called.id, t1.id);

    let skipped = h.engine.skip(&t1.id).await.unwrap();
    assert_eq!(skipped.status, TicketStatus::Waiting);
    assert_eq!(skipped.skip_count, 1);

    let view = h.engine.channel_view("umum").await.unwrap();
    assert!(view.current_ticket.is_none());

    let next = h.engine.call_next("umum").await.unwrap();
    assert_eq!(next.id, t3.id);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_select_exactly_one() {
    let h = TestHarness::new().await;
    for i in 0..5 {
        h.enroll(&format!("RM-{:03}", i), PriorityTier::Normal).await;
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move { engine.call_next("umum").await }));
    }

    let mut called = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => called += 1,
            Err(EngineError::ChannelBusy { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(called, 1);
    assert_eq!(h.active_count(), 1);
}

#[tokio::test]
async fn test_tier_order_then_arrival() {
    let h = TestHarness::new().await;
    h.enroll("vip", PriorityTier::Vip).await;
    h.enroll("normal-1", PriorityTier::Normal).await;
    h.enroll("urgent", PriorityTier::Urgent).await;
    h.enroll("normal-2", PriorityTier::Normal).await;

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(h.serve_next().await);
    }
    assert_eq!(order, vec!["vip", "urgent", "normal-1", "normal-2"]);
}

#[tokio::test]
async fn test_skip_demotion_respects_tier() {
    let h = TestHarness::new().await;
    let urgent = h.enroll("urgent", PriorityTier::Urgent).await;
    h.enroll("normal", PriorityTier::Normal).await;

    h.engine.call_next("umum").await.unwrap();
    h.engine.skip(&urgent.id).await.unwrap();

    // No other urgent ticket waits, so the skipped one keeps precedence.
    let next = h.engine.call_next("umum").await.unwrap();
    assert_eq!(next.id, urgent.id);
}

#[tokio::test]
async fn test_terminal_tickets_are_immutable() {
    let h = TestHarness::new().await;
    let done = h.enroll("done", PriorityTier::Normal).await;
    h.engine.call_next("umum").await.unwrap();
    h.engine.complete(&done.id).await.unwrap();

    let gone = h.enroll("gone", PriorityTier::Normal).await;
    h.engine.cancel(&gone.id, Some("went home")).await.unwrap();

    for id in [&done.id, &gone.id] {
        for result in [
            h.engine.recall(id).await,
            h.engine.begin_service(id).await,
            h.engine.complete(id).await,
            h.engine.skip(id).await,
            h.engine.requeue(id).await,
            h.engine.cancel(id, None).await,
        ] {
            assert!(matches!(result, Err(EngineError::InvalidState { .. })));
        }
    }

    let stored = h.engine.ticket(&done.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enrollment_numbers_are_unique() {
    let h = TestHarness::new().await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move {
            engine
                .enroll(EnrollRequest::new("umum", format!("RM-{:03}", i)))
                .await
        }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let ticket = handle.await.unwrap().unwrap();
        numbers.insert(ticket.queue_number);
    }

    assert_eq!(numbers.len(), 50);
    assert_eq!(numbers, (1..=50).collect::<HashSet<u32>>());
}

#[tokio::test]
async fn test_channels_number_independently() {
    let h = TestHarness::new().await;
    fixtures::register(&h.engine, "gigi", false).await;

    let a = h.enroll("RM-001", PriorityTier::Normal).await;
    let b = fixtures::enroll(&h.engine, "gigi", "RM-002").await;
    assert_eq!(a.queue_number, 1);
    assert_eq!(b.queue_number, 1);

    // A busy channel does not block another one.
    h.engine.call_next("umum").await.unwrap();
    let called = h.engine.call_next("gigi").await.unwrap();
    assert_eq!(called.id, b.id);
}

#[tokio::test]
async fn test_priority_holds_past_one_store_page() {
    let tickets = fixtures::in_memory_tickets();
    let engine = fixtures::engine_with(fixtures::engine_config(), Arc::clone(&tickets));
    fixtures::register(&engine, "umum", false).await;

    let backlog = 1000;
    for i in 0..backlog {
        tickets
            .create(CreateTicketRequest {
                channel_id: "umum".to_string(),
                patient_ref: format!("RM-{}", i),
                priority_tier: PriorityTier::Normal,
                service_date: engine.service_date(),
                notes: None,
            })
            .expect("create");
    }
    let vip = fixtures::enroll_tier(&engine, "umum", "RM-VIP", PriorityTier::Vip).await;

    let view = engine.channel_view("umum").await.unwrap();
    assert_eq!(view.waiting_count, backlog + 1);
    assert_eq!(view.next_ticket.as_ref().map(|t| t.id.as_str()), Some(vip.id.as_str()));
    assert_eq!(engine.queue("umum").await.unwrap().len(), backlog + 1);

    let called = engine.call_next("umum").await.unwrap();
    assert_eq!(called.id, vip.id);
    assert_eq!(called.priority_tier, PriorityTier::Vip);
}

// =============================================================================
// Transition rules
// =============================================================================

#[tokio::test]
async fn test_complete_requires_current_ticket() {
    let h = TestHarness::new().await;
    h.enroll("T1", PriorityTier::Normal).await;
    let t2 = h.enroll("T2", PriorityTier::Normal).await;
    h.engine.call_next("umum").await.unwrap();

    let err = h.engine.complete(&t2.id).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");
}

#[tokio::test]
async fn test_require_begin_service() {
    let h = TestHarness::with_config(EngineConfig {
        require_begin_service: true,
        ..fixtures::engine_config()
    })
    .await;
    let t1 = h.enroll("T1", PriorityTier::Normal).await;
    h.engine.call_next("umum").await.unwrap();

    assert!(matches!(
        h.engine.complete(&t1.id).await,
        Err(EngineError::InvalidState {
            status: TicketStatus::Called,
            ..
        })
    ));

    h.engine.begin_service(&t1.id).await.unwrap();
    h.engine.complete(&t1.id).await.unwrap();
}

#[tokio::test]
async fn test_park_policy_requires_requeue() {
    let h = TestHarness::with_config(EngineConfig {
        skip_policy: SkipPolicy::Park,
        ..fixtures::engine_config()
    })
    .await;
    let t1 = h.enroll("T1", PriorityTier::Normal).await;
    h.engine.call_next("umum").await.unwrap();

    let parked = h.engine.skip(&t1.id).await.unwrap();
    assert_eq!(parked.status, TicketStatus::Skipped);

    // Parked tickets are not in the waiting set.
    assert!(matches!(
        h.engine.call_next("umum").await,
        Err(EngineError::QueueEmpty { .. })
    ));

    let back = h.engine.requeue(&t1.id).await.unwrap();
    assert_eq!(back.status, TicketStatus::Waiting);
    assert_eq!(h.engine.call_next("umum").await.unwrap().id, t1.id);
}

#[tokio::test]
async fn test_recall_refreshes_call() {
    let h = TestHarness::new().await;
    let t1 = h.enroll("T1", PriorityTier::Normal).await;
    h.engine.call_next("umum").await.unwrap();
    h.engine.begin_service(&t1.id).await.unwrap();

    let recalled = h.engine.recall(&t1.id).await.unwrap();
    assert_eq!(recalled.status, TicketStatus::InService);
    assert_eq!(recalled.recall_count, 1);

    let waiting = h.enroll("T2", PriorityTier::Normal).await;
    assert!(matches!(
        h.engine.recall(&waiting.id).await,
        Err(EngineError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_closed_channel() {
    let h = TestHarness::new().await;
    h.enroll("T1", PriorityTier::Normal).await;
    h.engine
        .set_operating_status("umum", OperatingStatus::Closed)
        .await
        .unwrap();

    assert!(matches!(
        h.engine.call_next("umum").await,
        Err(EngineError::ChannelClosed {
            status: OperatingStatus::Closed,
            ..
        })
    ));
    assert!(matches!(
        h.engine
            .enroll(EnrollRequest::new("umum", "T2"))
            .await,
        Err(EngineError::ChannelClosed { .. })
    ));
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_events_follow_commits() {
    let h = TestHarness::new().await;
    let mut events = h.engine.subscribe();

    let t1 = h.enroll("T1", PriorityTier::Normal).await;
    h.engine.call_next("umum").await.unwrap();
    h.engine.complete(&t1.id).await.unwrap();

    let kinds: Vec<&'static str> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "ticket_enrolled",
            "ticket_transitioned",
            "ticket_transitioned",
            "channel_idle"
        ]
    );
}

#[tokio::test]
async fn test_refused_operations_publish_nothing() {
    let h = TestHarness::new().await;
    let mut events = h.engine.subscribe();

    let _ = h.engine.call_next("umum").await;
    assert!(events.try_recv().is_err());
}

// =============================================================================
// Store retries
// =============================================================================

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let flaky = Arc::new(FlakyTicketStore::new(fixtures::in_memory_tickets()));
    let engine = fixtures::engine_with(fixtures::engine_config(), flaky.clone());
    fixtures::register(&engine, "umum", false).await;

    flaky.fail_next(2);
    let ticket = engine
        .enroll(EnrollRequest::new("umum", "RM-001"))
        .await
        .unwrap();
    assert_eq!(ticket.queue_number, 1);
    assert_eq!(flaky.injected_failures(), 2);
}

#[tokio::test]
async fn test_persistent_store_failure_surfaces() {
    let flaky = Arc::new(FlakyTicketStore::new(fixtures::in_memory_tickets()));
    let engine = fixtures::engine_with(fixtures::engine_config(), flaky.clone());
    fixtures::register(&engine, "umum", false).await;
    fixtures::enroll(&engine, "umum", "RM-001").await;

    flaky.fail_next(100);
    let err = engine.call_next("umum").await.unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable(_)));
    assert_eq!(flaky.injected_failures(), 3);

    // Nothing was half-applied.
    flaky.fail_next(0);
    let called = engine.call_next("umum").await.unwrap();
    assert_eq!(called.status, TicketStatus::Called);
}

// =============================================================================
// Announcements
// =============================================================================

#[tokio::test]
async fn test_call_and_recall_are_announced() {
    let announcer = Arc::new(RecordingAnnouncer::new());
    let (engine, worker) = fixtures::engine_with_announcer(announcer.clone());
    tokio::spawn(worker.run());
    fixtures::register(&engine, "umum", false).await;
    let ticket = fixtures::enroll(&engine, "umum", "RM-001").await;

    engine.call_next("umum").await.unwrap();
    engine.recall(&ticket.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let announced = announcer.announcements();
    assert_eq!(announced.len(), 2);
    assert_eq!(announced[0].queue_label, "UMUM-001");
    assert_eq!(announced[0].channel_name, "Poli umum");
    assert_eq!(announced[0].recall_count, 0);
    assert_eq!(announced[1].recall_count, 1);
}

#[tokio::test]
async fn test_failed_announcement_does_not_fail_call() {
    let announcer = Arc::new(RecordingAnnouncer::new());
    announcer.fail_next(5);
    let (engine, worker) = fixtures::engine_with_announcer(announcer.clone());
    tokio::spawn(worker.run());
    fixtures::register(&engine, "umum", false).await;
    fixtures::enroll(&engine, "umum", "RM-001").await;

    let called = engine.call_next("umum").await.unwrap();
    assert_eq!(called.status, TicketStatus::Called);
}

#[tokio::test]
async fn test_missing_worker_does_not_fail_call() {
    let announcer = Arc::new(RecordingAnnouncer::new());
    let (engine, worker) = fixtures::engine_with_announcer(announcer);
    drop(worker);
    fixtures::register(&engine, "umum", false).await;
    fixtures::enroll(&engine, "umum", "RM-001").await;

    assert!(engine.call_next("umum").await.is_ok());
}

// =============================================================================
// Auto-call
// =============================================================================

#[tokio::test]
async fn test_auto_call_on_enroll_and_after_complete() {
    let engine = Arc::new(fixtures::engine());
    fixtures::register(&engine, "umum", true).await;
    let caller = AutoCaller::new(Arc::clone(&engine));
    caller.start().await;

    let t1 = fixtures::enroll(&engine, "umum", "RM-001").await;
    assert!(fixtures::wait_for_status(&engine, &t1.id, TicketStatus::Called).await);

    let t2 = fixtures::enroll(&engine, "umum", "RM-002").await;
    engine.complete(&t1.id).await.unwrap();
    assert!(fixtures::wait_for_status(&engine, &t2.id, TicketStatus::Called).await);

    caller.stop().await;
}

#[tokio::test]
async fn test_auto_call_resumes_when_channel_reopens() {
    let engine = Arc::new(fixtures::engine());
    fixtures::register(&engine, "umum", true).await;
    engine
        .set_operating_status("umum", OperatingStatus::Break)
        .await
        .unwrap();

    let caller = AutoCaller::new(Arc::clone(&engine));
    caller.start().await;

    let t1 = fixtures::enroll(&engine, "umum", "RM-001").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        engine.ticket(&t1.id).await.unwrap().status,
        TicketStatus::Waiting
    );

    engine
        .set_operating_status("umum", OperatingStatus::Active)
        .await
        .unwrap();
    assert!(fixtures::wait_for_status(&engine, &t1.id, TicketStatus::Called).await);

    caller.stop().await;
}

#[tokio::test]
async fn test_auto_call_skips_when_queue_empty() {
    let engine = Arc::new(fixtures::engine());
    fixtures::register(&engine, "umum", true).await;
    let caller = AutoCaller::new(Arc::clone(&engine));
    caller.start().await;

    let t1 = fixtures::enroll(&engine, "umum", "RM-001").await;
    assert!(fixtures::wait_for_status(&engine, &t1.id, TicketStatus::Called).await);

    // Completing the only ticket leaves the channel idle with nobody to call.
    engine.complete(&t1.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = engine.channel_view("umum").await.unwrap();
    assert!(view.current_ticket.is_none());
    assert!(caller.is_running());

    caller.stop().await;
}

#[tokio::test]
async fn test_events_carry_channel_registration() {
    let engine = fixtures::engine();
    let mut events = engine.subscribe();
    engine
        .register_channel(NewChannel::new("anak", "ANK", "Poli Anak"))
        .await
        .unwrap();

    match events.try_recv().unwrap() {
        QueueEvent::ChannelUpdated { channel } => assert_eq!(channel.code, "ANK"),
        other => panic!("unexpected event: {:?}", other),
    }
}
