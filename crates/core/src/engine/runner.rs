//! Queue engine implementation.
//!
//! Mutating operations on one channel are serialized through that channel's
//! mutex; different channels never contend. Inside the mutex the engine
//! re-reads the ticket set, plans the transition and commits it with one
//! conditional store update.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError, ChannelStore, NewChannel, OperatingStatus};
use crate::lifecycle::{self, TicketAction, Transition};
use crate::metrics;
use crate::notify::{AnnounceRequest, NotificationHandle};
use crate::scheduler;
use crate::ticket::{
    CreateTicketRequest, Ticket, TicketError, TicketFilter, TicketStatus, TicketStore,
};

use super::config::EngineConfig;
use super::types::{ChannelView, EngineError, EnrollRequest, QueueEvent};

/// Store errors that may be retried.
trait StoreFailure: std::fmt::Display {
    fn is_unavailable(&self) -> bool;
}

impl StoreFailure for TicketError {
    fn is_unavailable(&self) -> bool {
        matches!(self, TicketError::Unavailable(_))
    }
}

impl StoreFailure for ChannelError {
    fn is_unavailable(&self) -> bool {
        matches!(self, ChannelError::Unavailable(_))
    }
}

/// Tickets of one channel, split the way every read needs them.
struct ChannelTickets {
    /// `called` or `in_service`; more than one means storage was edited behind our back.
    active: Vec<Ticket>,
    /// Today's waiting set, in service order.
    waiting: Vec<Ticket>,
    /// Tickets completed today.
    completed: Vec<Ticket>,
}

/// The queue engine: every operation on channels and tickets goes through here.
pub struct QueueEngine {
    config: EngineConfig,
    tickets: Arc<dyn TicketStore>,
    channels: Arc<dyn ChannelStore>,
    notifier: Option<NotificationHandle>,
    events: broadcast::Sender<QueueEvent>,
    channel_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl QueueEngine {
    /// Create a new engine.
    pub fn new(
        config: EngineConfig,
        tickets: Arc<dyn TicketStore>,
        channels: Arc<dyn ChannelStore>,
        notifier: Option<NotificationHandle>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            config,
            tickets,
            channels,
            notifier,
            events,
            channel_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to committed state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// The service date queue numbers are currently allocated for.
    pub fn service_date(&self) -> NaiveDate {
        self.service_date_at(Utc::now())
    }

    fn service_date_at(&self, now: DateTime<Utc>) -> NaiveDate {
        (now + chrono::Duration::minutes(i64::from(self.config.utc_offset_minutes))).date_naive()
    }

    // =========================================================================
    // Channels
    // =========================================================================

    /// Register a new channel (initially `active`).
    pub async fn register_channel(&self, channel: NewChannel) -> Result<Channel, EngineError> {
        let result = self.register_channel_inner(channel).await;
        observe("register_channel", &result);
        result
    }

    async fn register_channel_inner(&self, channel: NewChannel) -> Result<Channel, EngineError> {
        channel.validate().map_err(EngineError::Validation)?;

        let created = self
            .with_retry("register_channel", || self.channels.create(channel.clone()))
            .await?;

        info!(
            "Registered channel {} ({}, auto_call={})",
            created.id, created.code, created.auto_call
        );
        self.publish(QueueEvent::ChannelUpdated {
            channel: created.clone(),
        });
        Ok(created)
    }

    /// Register channels from config that don't exist yet.
    ///
    /// Existing channels keep their stored status and auto-call flag.
    pub async fn seed_channels(&self, seeds: &[NewChannel]) -> Result<usize, EngineError> {
        let mut created = 0;
        for seed in seeds {
            let existing = self
                .with_retry("seed_channels", || self.channels.get(&seed.id))
                .await?;
            if existing.is_some() {
                debug!("Channel {} already registered", seed.id);
                continue;
            }
            self.register_channel(seed.clone()).await?;
            created += 1;
        }
        Ok(created)
    }

    /// Change a channel's operating status.
    ///
    /// Reopening an idle channel publishes `ChannelIdle` so the auto-caller
    /// can pick up anyone who enrolled during the break.
    pub async fn set_operating_status(
        &self,
        channel_id: &str,
        status: OperatingStatus,
    ) -> Result<Channel, EngineError> {
        let result = self.set_operating_status_inner(channel_id, status).await;
        observe("set_operating_status", &result);
        result
    }

    async fn set_operating_status_inner(
        &self,
        channel_id: &str,
        status: OperatingStatus,
    ) -> Result<Channel, EngineError> {
        self.channel(channel_id).await?;
        let lock = self.channel_lock(channel_id).await;
        let _guard = lock.lock().await;

        let channel = self
            .with_retry("set_operating_status", || {
                self.channels.set_operating_status(channel_id, status)
            })
            .await?;

        info!("Channel {} is now {}", channel.id, status);
        self.publish(QueueEvent::ChannelUpdated {
            channel: channel.clone(),
        });

        if status.is_callable() && !self.has_active_ticket(channel_id).await? {
            self.publish(QueueEvent::ChannelIdle {
                channel_id: channel.id.clone(),
            });
        }
        Ok(channel)
    }

    /// Enable or disable auto-call for a channel.
    pub async fn set_auto_call(
        &self,
        channel_id: &str,
        enabled: bool,
    ) -> Result<Channel, EngineError> {
        let result = self.set_auto_call_inner(channel_id, enabled).await;
        observe("set_auto_call", &result);
        result
    }

    async fn set_auto_call_inner(
        &self,
        channel_id: &str,
        enabled: bool,
    ) -> Result<Channel, EngineError> {
        self.channel(channel_id).await?;
        let lock = self.channel_lock(channel_id).await;
        let _guard = lock.lock().await;

        let channel = self
            .with_retry("set_auto_call", || self.channels.set_auto_call(channel_id, enabled))
            .await?;

        info!("Channel {} auto-call {}", channel.id, if enabled { "on" } else { "off" });
        self.publish(QueueEvent::ChannelUpdated {
            channel: channel.clone(),
        });

        if enabled
            && channel.operating_status.is_callable()
            && !self.has_active_ticket(channel_id).await?
        {
            self.publish(QueueEvent::ChannelIdle {
                channel_id: channel.id.clone(),
            });
        }
        Ok(channel)
    }

    /// Get a channel record.
    pub async fn channel(&self, channel_id: &str) -> Result<Channel, EngineError> {
        self.with_retry("get_channel", || self.channels.get(channel_id))
            .await?
            .ok_or_else(|| EngineError::channel_not_found(channel_id))
    }

    /// Derived view of a channel: current/next ticket and counters.
    pub async fn channel_view(&self, channel_id: &str) -> Result<ChannelView, EngineError> {
        let channel = self.channel(channel_id).await?;
        self.build_view(channel).await
    }

    /// Views of every registered channel, ordered by ID.
    pub async fn list_channels(&self) -> Result<Vec<ChannelView>, EngineError> {
        let channels = self
            .with_retry("list_channels", || self.channels.list())
            .await?;

        let mut views = Vec::with_capacity(channels.len());
        for channel in channels {
            views.push(self.build_view(channel).await?);
        }
        Ok(views)
    }

    async fn build_view(&self, channel: Channel) -> Result<ChannelView, EngineError> {
        let mut tickets = self.channel_tickets(&channel.id).await?;
        let average = self.average_service_minutes(&tickets);
        scheduler::estimate_waits(&mut tickets.waiting, !tickets.active.is_empty(), average);

        Ok(ChannelView {
            current_ticket: tickets.active.into_iter().next(),
            next_ticket: tickets.waiting.first().cloned(),
            waiting_count: tickets.waiting.len(),
            served_count: tickets.completed.len(),
            average_service_minutes: average,
            channel,
        })
    }

    /// Today's waiting tickets in call order, with wait estimates.
    pub async fn queue(&self, channel_id: &str) -> Result<Vec<Ticket>, EngineError> {
        self.channel(channel_id).await?;
        let mut tickets = self.channel_tickets(channel_id).await?;
        let average = self.average_service_minutes(&tickets);
        scheduler::estimate_waits(&mut tickets.waiting, !tickets.active.is_empty(), average);
        Ok(tickets.waiting)
    }

    /// Get a ticket; waiting tickets carry a wait estimate.
    pub async fn ticket(&self, ticket_id: &str) -> Result<Ticket, EngineError> {
        let ticket = self.load_ticket(ticket_id).await?;
        Ok(self.with_estimate(ticket).await)
    }

    async fn with_estimate(&self, mut ticket: Ticket) -> Ticket {
        if ticket.status != TicketStatus::Waiting {
            return ticket;
        }
        match self.queue(&ticket.channel_id).await {
            Ok(queue) => {
                ticket.estimated_wait_minutes = queue
                    .iter()
                    .find(|t| t.id == ticket.id)
                    .and_then(|t| t.estimated_wait_minutes);
            }
            Err(e) => warn!("Could not estimate wait for ticket {}: {}", ticket.id, e),
        }
        ticket
    }

    // =========================================================================
    // Ticket operations
    // =========================================================================

    /// Add a patient to a channel's waiting set.
    ///
    /// Does not take the channel lock: the store allocates the queue number
    /// and inserts the ticket atomically.
    pub async fn enroll(&self, request: EnrollRequest) -> Result<Ticket, EngineError> {
        let result = self.enroll_inner(request).await;
        observe("enroll", &result);
        result
    }

    async fn enroll_inner(&self, request: EnrollRequest) -> Result<Ticket, EngineError> {
        request.validate().map_err(EngineError::Validation)?;

        let channel = self.channel(&request.channel_id).await?;
        if !channel.operating_status.accepts_enrollment() {
            return Err(EngineError::ChannelClosed {
                channel_id: channel.id,
                status: channel.operating_status,
            });
        }

        let create = CreateTicketRequest {
            channel_id: channel.id.clone(),
            patient_ref: request.patient_ref.trim().to_string(),
            priority_tier: request.priority_tier,
            service_date: self.service_date(),
            notes: request.notes,
        };
        let ticket = self
            .with_retry("enroll", || self.tickets.create(create.clone()))
            .await?;

        info!(
            "Enrolled {} ({}) on channel {}",
            ticket.label(&channel.code),
            ticket.priority_tier,
            channel.id
        );
        self.publish(QueueEvent::TicketEnrolled {
            ticket: ticket.clone(),
        });

        Ok(self.with_estimate(ticket).await)
    }

    /// Call the highest-priority waiting ticket to the channel.
    pub async fn call_next(&self, channel_id: &str) -> Result<Ticket, EngineError> {
        let result = self.call_next_inner(channel_id).await;
        observe("call_next", &result);
        result
    }

    async fn call_next_inner(&self, channel_id: &str) -> Result<Ticket, EngineError> {
        // Unknown channels never get a lock entry.
        self.channel(channel_id).await?;
        let lock = self.channel_lock(channel_id).await;
        let _guard = lock.lock().await;

        let channel = self.channel(channel_id).await?;
        if !channel.operating_status.is_callable() {
            return Err(EngineError::ChannelClosed {
                channel_id: channel.id,
                status: channel.operating_status,
            });
        }

        let mut conflicts = 0;
        loop {
            let tickets = self.channel_tickets(channel_id).await?;
            if let Some(current) = tickets.active.first() {
                return Err(EngineError::ChannelBusy {
                    channel_id: channel.id,
                    current_ticket_id: current.id.clone(),
                });
            }

            let Some(next) = scheduler::select_next(&tickets.waiting) else {
                return Err(EngineError::QueueEmpty {
                    channel_id: channel.id,
                });
            };

            let transition = lifecycle::plan_call(next, Utc::now())?;
            match self.commit(next, &transition).await {
                Ok(called) => {
                    if called.skip_count == 0 {
                        if let Some(called_at) = called.called_at {
                            let waited = (called_at - called.enqueued_at).num_seconds() as f64 / 60.0;
                            metrics::WAIT_MINUTES
                                .with_label_values(&[channel.id.as_str(), called.priority_tier.as_str()])
                                .observe(waited.max(0.0));
                        }
                    }

                    info!(
                        "Called {} on channel {}",
                        called.label(&channel.code),
                        channel.id
                    );
                    self.announce(&channel, &called);
                    self.publish(QueueEvent::TicketTransitioned {
                        operation: "call_next".to_string(),
                        ticket: called.clone(),
                    });
                    return Ok(called);
                }
                Err(TicketError::Conflict {
                    ticket_id, actual, ..
                }) => {
                    metrics::CALL_CONFLICTS.inc();
                    conflicts += 1;
                    if conflicts > self.config.call_attempts {
                        return Err(EngineError::InvalidState {
                            ticket_id,
                            status: actual,
                            operation: "call_next".to_string(),
                        });
                    }
                    debug!(
                        "Ticket {} changed to {} under call_next, reselecting",
                        ticket_id, actual
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Re-announce the current ticket.
    pub async fn recall(&self, ticket_id: &str) -> Result<Ticket, EngineError> {
        self.transition(TicketAction::Recall, ticket_id, None).await
    }

    /// Start serving a called ticket.
    pub async fn begin_service(&self, ticket_id: &str) -> Result<Ticket, EngineError> {
        self.transition(TicketAction::BeginService, ticket_id, None)
            .await
    }

    /// Finish serving the current ticket.
    pub async fn complete(&self, ticket_id: &str) -> Result<Ticket, EngineError> {
        self.transition(TicketAction::Complete, ticket_id, None).await
    }

    /// Skip a called patient who did not show up.
    pub async fn skip(&self, ticket_id: &str) -> Result<Ticket, EngineError> {
        self.transition(TicketAction::Skip, ticket_id, None).await
    }

    /// Put a parked (skipped) ticket back in the waiting set.
    pub async fn requeue(&self, ticket_id: &str) -> Result<Ticket, EngineError> {
        self.transition(TicketAction::Requeue, ticket_id, None).await
    }

    /// Cancel a ticket that has not been completed.
    pub async fn cancel(
        &self,
        ticket_id: &str,
        reason: Option<&str>,
    ) -> Result<Ticket, EngineError> {
        self.transition(TicketAction::Cancel, ticket_id, reason)
            .await
    }

    async fn transition(
        &self,
        action: TicketAction,
        ticket_id: &str,
        reason: Option<&str>,
    ) -> Result<Ticket, EngineError> {
        let result = self.transition_inner(action, ticket_id, reason).await;
        observe(action.as_str(), &result);
        result
    }

    async fn transition_inner(
        &self,
        action: TicketAction,
        ticket_id: &str,
        reason: Option<&str>,
    ) -> Result<Ticket, EngineError> {
        let channel_id = self.load_ticket(ticket_id).await?.channel_id;

        let lock = self.channel_lock(&channel_id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock; the first read only located the channel.
        let ticket = self.load_ticket(ticket_id).await?;
        let transition =
            lifecycle::plan(action, &ticket, self.config.transition_rules(), Utc::now())?;

        let updated = self.commit(&ticket, &transition).await.map_err(|e| match e {
            TicketError::Conflict {
                ticket_id, actual, ..
            } => EngineError::InvalidState {
                ticket_id,
                status: actual,
                operation: action.as_str().to_string(),
            },
            other => other.into(),
        })?;

        match reason {
            Some(reason) => info!(
                "Ticket {} {}: {} -> {} ({})",
                updated.id, action, ticket.status, updated.status, reason
            ),
            None => info!(
                "Ticket {} {}: {} -> {}",
                updated.id, action, ticket.status, updated.status
            ),
        }

        if transition.announces() {
            match self.channel(&channel_id).await {
                Ok(channel) => self.announce(&channel, &updated),
                Err(e) => warn!("Skipping announcement for ticket {}: {}", updated.id, e),
            }
        }

        self.publish(QueueEvent::TicketTransitioned {
            operation: action.as_str().to_string(),
            ticket: updated.clone(),
        });
        if transition.releases_channel() {
            self.publish(QueueEvent::ChannelIdle { channel_id });
        }

        Ok(updated)
    }

    /// Apply a planned transition with a conditional update.
    async fn commit(&self, ticket: &Ticket, transition: &Transition) -> Result<Ticket, TicketError> {
        let updated = self
            .with_retry("update_ticket", || {
                self.tickets
                    .update_if_status(&ticket.id, transition.expected, transition.update.clone())
            })
            .await?;

        if transition.expected != updated.status {
            metrics::TICKET_TRANSITIONS
                .with_label_values(&[transition.expected.as_str(), updated.status.as_str()])
                .inc();
        }
        Ok(updated)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Callers must have checked that the channel exists.
    async fn channel_lock(&self, channel_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.channel_locks.read().await.get(channel_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.channel_locks.write().await;
        Arc::clone(locks.entry(channel_id.to_string()).or_default())
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.channel_locks.read().await.len()
    }

    async fn load_ticket(&self, ticket_id: &str) -> Result<Ticket, EngineError> {
        self.with_retry("get_ticket", || self.tickets.get(ticket_id))
            .await?
            .ok_or_else(|| EngineError::ticket_not_found(ticket_id))
    }

    fn active_filter(channel_id: &str) -> TicketFilter {
        TicketFilter::new()
            .with_channel(channel_id)
            .with_statuses(&[TicketStatus::Called, TicketStatus::InService])
            .unbounded()
    }

    async fn active_tickets(&self, channel_id: &str) -> Result<Vec<Ticket>, EngineError> {
        let filter = Self::active_filter(channel_id);
        Ok(self
            .with_retry("list_tickets", || self.tickets.list(&filter))
            .await?)
    }

    async fn has_active_ticket(&self, channel_id: &str) -> Result<bool, EngineError> {
        let filter = Self::active_filter(channel_id);
        let active = self
            .with_retry("count_tickets", || self.tickets.count(&filter))
            .await?;
        Ok(active > 0)
    }

    async fn channel_tickets(&self, channel_id: &str) -> Result<ChannelTickets, EngineError> {
        let today = self.service_date();

        let active = self.active_tickets(channel_id).await?;
        if active.len() > 1 {
            warn!(
                "Channel {} has {} active tickets; expected at most one",
                channel_id,
                active.len()
            );
        }

        let waiting_filter = TicketFilter::new()
            .with_channel(channel_id)
            .with_status(TicketStatus::Waiting)
            .with_service_date(today)
            .unbounded();
        let waiting = self
            .with_retry("list_tickets", || self.tickets.list(&waiting_filter))
            .await?;

        let completed_filter = TicketFilter::new()
            .with_channel(channel_id)
            .with_status(TicketStatus::Completed)
            .with_service_date(today)
            .unbounded();
        let completed = self
            .with_retry("list_tickets", || self.tickets.list(&completed_filter))
            .await?;

        Ok(ChannelTickets {
            active,
            waiting: scheduler::order_queue(waiting),
            completed,
        })
    }

    fn average_service_minutes(&self, tickets: &ChannelTickets) -> f64 {
        scheduler::average_service_minutes(tickets.completed.iter())
            .unwrap_or(self.config.default_service_minutes)
    }

    fn announce(&self, channel: &Channel, ticket: &Ticket) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        notifier.announce(AnnounceRequest {
            ticket_id: ticket.id.clone(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            queue_number: ticket.queue_number,
            queue_label: ticket.label(&channel.code),
            patient_ref: ticket.patient_ref.clone(),
            recall_count: ticket.recall_count,
        });
    }

    fn publish(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Run a store call, retrying transient failures with exponential backoff.
    async fn with_retry<T, E>(
        &self,
        operation: &'static str,
        mut call: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: StoreFailure,
    {
        let policy = &self.config.store_retry;
        let mut attempt = 1;
        loop {
            match call() {
                Err(e) if e.is_unavailable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff_ms(attempt);
                    warn!(
                        "Store unavailable during {} (attempt {}/{}), retrying in {}ms: {}",
                        operation, attempt, policy.max_attempts, delay, e
                    );
                    metrics::STORE_RETRIES
                        .with_label_values(&[operation])
                        .inc();
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn observe<T>(operation: &str, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => {
            debug!("{} refused: {}", operation, e);
            e.code()
        }
    };
    metrics::OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}
