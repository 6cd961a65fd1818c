//! Ticket storage trait and types.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::ticket::{PriorityTier, Ticket, TicketStatus};

/// Error type for ticket storage operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TicketError {
    /// Ticket not found.
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// A conditional update lost against a concurrent writer.
    #[error("ticket {ticket_id} is {actual}, expected {expected}")]
    Conflict {
        ticket_id: String,
        expected: TicketStatus,
        actual: TicketStatus,
    },

    /// Storage I/O failure (transient).
    #[error("ticket store unavailable: {0}")]
    Unavailable(String),
}

/// Request to enroll a new ticket.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub channel_id: String,
    pub patient_ref: String,
    pub priority_tier: PriorityTier,
    /// Day the queue number is allocated for.
    pub service_date: NaiveDate,
    pub notes: Option<String>,
}

/// Page size used when a filter does not set its own limit.
pub const DEFAULT_LIST_LIMIT: i64 = 1000;

/// Filter for querying tickets.
#[derive(Debug, Clone)]
pub struct TicketFilter {
    /// Restrict to one channel.
    pub channel_id: Option<String>,
    /// Restrict to these statuses (empty = any).
    pub statuses: Vec<TicketStatus>,
    /// Restrict to one service date.
    pub service_date: Option<NaiveDate>,
    /// Maximum number of results; `None` returns every match.
    pub limit: Option<i64>,
    /// Offset for pagination.
    pub offset: i64,
}

impl TicketFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            channel_id: None,
            statuses: Vec::new(),
            service_date: None,
            limit: Some(DEFAULT_LIST_LIMIT),
            offset: 0,
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_statuses(mut self, statuses: &[TicketStatus]) -> Self {
        self.statuses.extend_from_slice(statuses);
        self
    }

    pub fn with_service_date(mut self, date: NaiveDate) -> Self {
        self.service_date = Some(date);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return every matching ticket, however many there are.
    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for TicketFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Field changes applied atomically together with a status check.
///
/// Timestamp fields left as `None` keep their stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketUpdate {
    pub status: TicketStatus,
    pub called_at: Option<DateTime<Utc>>,
    pub service_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub increment_recall: bool,
    pub increment_skip: bool,
}

impl TicketUpdate {
    /// Update that moves the ticket to `status` and touches nothing else.
    pub fn to(status: TicketStatus) -> Self {
        Self {
            status,
            called_at: None,
            service_started_at: None,
            completed_at: None,
            cancelled_at: None,
            skipped_at: None,
            increment_recall: false,
            increment_skip: false,
        }
    }

    pub fn called_at(mut self, at: DateTime<Utc>) -> Self {
        self.called_at = Some(at);
        self
    }

    pub fn service_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.service_started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn cancelled_at(mut self, at: DateTime<Utc>) -> Self {
        self.cancelled_at = Some(at);
        self
    }

    pub fn skipped_at(mut self, at: DateTime<Utc>) -> Self {
        self.skipped_at = Some(at);
        self
    }

    pub fn increment_recall(mut self) -> Self {
        self.increment_recall = true;
        self
    }

    pub fn increment_skip(mut self) -> Self {
        self.increment_skip = true;
        self
    }

    /// Apply this update to an in-memory ticket.
    pub fn apply(&self, ticket: &mut Ticket, now: DateTime<Utc>) {
        ticket.status = self.status;
        if let Some(at) = self.called_at {
            ticket.called_at = Some(at);
        }
        if let Some(at) = self.service_started_at {
            ticket.service_started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            ticket.completed_at = Some(at);
        }
        if let Some(at) = self.cancelled_at {
            ticket.cancelled_at = Some(at);
        }
        if let Some(at) = self.skipped_at {
            ticket.skipped_at = Some(at);
        }
        if self.increment_recall {
            ticket.recall_count += 1;
        }
        if self.increment_skip {
            ticket.skip_count += 1;
        }
        ticket.updated_at = now;
    }
}

/// Trait for ticket storage backends.
///
/// `update_if_status` is the primitive the engine's atomicity rests on: the
/// update must only be applied while the stored status equals `expected`.
pub trait TicketStore: Send + Sync {
    /// Create a `waiting` ticket, allocating the next queue number for its
    /// (channel, service date) atomically.
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError>;

    /// Get a ticket by ID.
    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    /// List tickets matching the filter, oldest enrollment first.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError>;

    /// Count tickets matching the filter.
    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError>;

    /// Apply `update` only if the ticket's status is still `expected`.
    ///
    /// Returns `Conflict` with the observed status otherwise.
    fn update_if_status(
        &self,
        id: &str,
        expected: TicketStatus,
        update: TicketUpdate,
    ) -> Result<Ticket, TicketError>;
}
