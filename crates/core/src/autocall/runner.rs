//! Auto-caller background loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineError, QueueEngine, QueueEvent};
use crate::metrics;
use crate::ticket::Ticket;

/// Calls the next ticket on idle auto-call channels.
pub struct AutoCaller {
    engine: Arc<QueueEngine>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoCaller {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            engine,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the auto-caller (spawns the event loop).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Auto-caller already running");
            return;
        }

        info!("Starting auto-caller");

        // Subscribe before the sweep so nothing committed in between is missed.
        let events = self.engine.subscribe();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let engine = Arc::clone(&self.engine);

        let handle = tokio::spawn(async move {
            sweep(&engine).await;
            run_loop(engine, events, shutdown_rx).await;
        });
        *self.task.lock().await = Some(handle);

        info!("Auto-caller started");
    }

    /// Stop the auto-caller and wait for the loop to exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Auto-caller not running");
            return;
        }

        info!("Stopping auto-caller");
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Auto-caller task ended abnormally: {}", e);
            }
        }

        info!("Auto-caller stopped");
    }
}

async fn run_loop(
    engine: Arc<QueueEngine>,
    mut events: broadcast::Receiver<QueueEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Auto-caller received shutdown signal");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(channel_id) = trigger(&event) {
                            try_call(&engine, channel_id).await;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Auto-caller missed {} events, sweeping all channels", missed);
                        sweep(&engine).await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Engine event stream closed");
                        break;
                    }
                }
            }
        }
    }
}

/// Channel that may now be callable after `event`.
fn trigger(event: &QueueEvent) -> Option<&str> {
    match event {
        QueueEvent::ChannelIdle { channel_id } => Some(channel_id.as_str()),
        QueueEvent::TicketEnrolled { ticket } => Some(ticket.channel_id.as_str()),
        _ => None,
    }
}

async fn try_call(engine: &QueueEngine, channel_id: &str) {
    let channel = match engine.channel(channel_id).await {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Auto-caller could not read channel {}: {}", channel_id, e);
            return;
        }
    };
    if !channel.auto_call || !channel.operating_status.is_callable() {
        return;
    }

    let result = engine.call_next(channel_id).await;
    let outcome = call_outcome(&result);
    match result {
        Ok(ticket) => info!(
            "Auto-called {} on channel {}",
            ticket.label(&channel.code),
            channel_id
        ),
        Err(e) => match outcome {
            "skipped" => debug!("Auto-call on {} not needed: {}", channel_id, e),
            "deferred" => warn!("Auto-call on {} deferred to next trigger: {}", channel_id, e),
            _ => error!("Auto-call on {} failed: {}", channel_id, e),
        },
    }
    metrics::AUTO_CALLS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Metric label for one auto-call attempt.
///
/// Transient store failures are `deferred`: the next idle event or sweep
/// tries again.
fn call_outcome(result: &Result<Ticket, EngineError>) -> &'static str {
    match result {
        Ok(_) => "called",
        Err(
            EngineError::QueueEmpty { .. }
            | EngineError::ChannelBusy { .. }
            | EngineError::ChannelClosed { .. },
        ) => "skipped",
        Err(e) if e.is_transient() => "deferred",
        Err(_) => "error",
    }
}

async fn sweep(engine: &QueueEngine) {
    let views = match engine.list_channels().await {
        Ok(views) => views,
        Err(e) => {
            warn!("Auto-caller sweep failed: {}", e);
            return;
        }
    };

    for view in views {
        if view.channel.auto_call
            && view.channel.operating_status.is_callable()
            && view.current_ticket.is_none()
            && view.waiting_count > 0
        {
            try_call(engine, &view.channel.id).await;
        }
    }
}
