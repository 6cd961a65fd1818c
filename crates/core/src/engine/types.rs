//! Types for the queue engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{Channel, ChannelError, OperatingStatus};
use crate::lifecycle::InvalidTransition;
use crate::ticket::{PriorityTier, Ticket, TicketError, TicketStatus};

/// Errors returned by engine operations.
///
/// Everything except `StoreUnavailable` is a business outcome the caller is
/// expected to handle; none of them are retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The channel's operating status does not allow the operation.
    #[error("channel {channel_id} is {status}")]
    ChannelClosed {
        channel_id: String,
        status: OperatingStatus,
    },

    /// The channel already has a called or in-service ticket.
    #[error("channel {channel_id} is already serving ticket {current_ticket_id}")]
    ChannelBusy {
        channel_id: String,
        current_ticket_id: String,
    },

    /// No waiting ticket on the channel.
    #[error("no waiting tickets on channel {channel_id}")]
    QueueEmpty { channel_id: String },

    /// The ticket's status does not allow the operation.
    #[error("cannot {operation} ticket {ticket_id}: ticket is {status}")]
    InvalidState {
        ticket_id: String,
        status: TicketStatus,
        operation: String,
    },

    /// Unknown channel or ticket.
    #[error("{0}")]
    NotFound(String),

    /// Storage failed even after retrying.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed request.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Channel ID already registered.
    #[error("channel already exists: {0}")]
    AlreadyExists(String),
}

impl EngineError {
    /// Stable snake_case identifier, used as the `code` of API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ChannelClosed { .. } => "channel_closed",
            EngineError::ChannelBusy { .. } => "channel_busy",
            EngineError::QueueEmpty { .. } => "queue_empty",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::NotFound(_) => "not_found",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::Validation(_) => "validation",
            EngineError::AlreadyExists(_) => "already_exists",
        }
    }

    /// Whether the failure is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_))
    }

    pub(crate) fn channel_not_found(channel_id: &str) -> Self {
        EngineError::NotFound(format!("channel not found: {}", channel_id))
    }

    pub(crate) fn ticket_not_found(ticket_id: &str) -> Self {
        EngineError::NotFound(format!("ticket not found: {}", ticket_id))
    }
}

impl From<TicketError> for EngineError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::NotFound(id) => EngineError::ticket_not_found(&id),
            TicketError::Conflict {
                ticket_id, actual, ..
            } => EngineError::InvalidState {
                ticket_id,
                status: actual,
                operation: "update".to_string(),
            },
            TicketError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
        }
    }
}

impl From<ChannelError> for EngineError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::NotFound(id) => EngineError::channel_not_found(&id),
            ChannelError::AlreadyExists(id) => EngineError::AlreadyExists(id),
            ChannelError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
        }
    }
}

impl From<InvalidTransition> for EngineError {
    fn from(err: InvalidTransition) -> Self {
        EngineError::InvalidState {
            ticket_id: err.ticket_id,
            status: err.status,
            operation: err.operation.to_string(),
        }
    }
}

/// Request to add a patient to a channel's queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollRequest {
    pub channel_id: String,
    pub patient_ref: String,
    #[serde(default)]
    pub priority_tier: PriorityTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EnrollRequest {
    pub fn new(channel_id: impl Into<String>, patient_ref: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            patient_ref: patient_ref.into(),
            priority_tier: PriorityTier::Normal,
            notes: None,
        }
    }

    pub fn with_tier(mut self, tier: PriorityTier) -> Self {
        self.priority_tier = tier;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.channel_id.trim().is_empty() {
            return Err("channel_id cannot be empty".to_string());
        }
        if self.patient_ref.trim().is_empty() {
            return Err("patient_ref cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Read-only projection of a channel, derived from the ticket set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelView {
    #[serde(flatten)]
    pub channel: Channel,
    /// Ticket currently `called` or `in_service`, if any.
    pub current_ticket: Option<Ticket>,
    /// Ticket the next call_next would select.
    pub next_ticket: Option<Ticket>,
    pub waiting_count: usize,
    /// Tickets completed on the current service date.
    pub served_count: usize,
    pub average_service_minutes: f64,
}

/// State change published to subscribers after a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A new ticket joined a channel's waiting set.
    TicketEnrolled { ticket: Ticket },
    /// A ticket changed status or was recalled.
    TicketTransitioned { operation: String, ticket: Ticket },
    /// The channel has no current ticket anymore.
    ChannelIdle { channel_id: String },
    /// Channel registered or its settings changed.
    ChannelUpdated { channel: Channel },
}

impl QueueEvent {
    pub fn channel_id(&self) -> &str {
        match self {
            QueueEvent::TicketEnrolled { ticket } => &ticket.channel_id,
            QueueEvent::TicketTransitioned { ticket, .. } => &ticket.channel_id,
            QueueEvent::ChannelIdle { channel_id } => channel_id,
            QueueEvent::ChannelUpdated { channel } => &channel.id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::TicketEnrolled { .. } => "ticket_enrolled",
            QueueEvent::TicketTransitioned { .. } => "ticket_transitioned",
            QueueEvent::ChannelIdle { .. } => "channel_idle",
            QueueEvent::ChannelUpdated { .. } => "channel_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EngineError::QueueEmpty {
            channel_id: "umum".to_string(),
        };
        assert_eq!(err.code(), "queue_empty");
        assert_eq!(err.to_string(), "no waiting tickets on channel umum");
        assert!(!err.is_transient());

        let err = EngineError::ChannelClosed {
            channel_id: "umum".to_string(),
            status: OperatingStatus::Break,
        };
        assert_eq!(err.code(), "channel_closed");
        assert_eq!(err.to_string(), "channel umum is break");

        assert!(EngineError::StoreUnavailable("disk".to_string()).is_transient());
    }

    #[test]
    fn test_from_ticket_error() {
        let err: EngineError = TicketError::Unavailable("locked".to_string()).into();
        assert_eq!(err, EngineError::StoreUnavailable("locked".to_string()));

        let err: EngineError = TicketError::NotFound("t-9".to_string()).into();
        assert_eq!(err, EngineError::NotFound("ticket not found: t-9".to_string()));

        let err: EngineError = TicketError::Conflict {
            ticket_id: "t-1".to_string(),
            expected: TicketStatus::Waiting,
            actual: TicketStatus::Cancelled,
        }
        .into();
        assert_eq!(err.code(), "invalid_state");
    }

    #[test]
    fn test_from_channel_error() {
        let err: EngineError = ChannelError::AlreadyExists("umum".to_string()).into();
        assert_eq!(err, EngineError::AlreadyExists("umum".to_string()));
    }

    #[test]
    fn test_enroll_request_defaults() {
        let json = r#"{"channel_id":"umum","patient_ref":"RM-0042"}"#;
        let request: EnrollRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.priority_tier, PriorityTier::Normal);
        assert!(request.notes.is_none());
        assert!(request.validate().is_ok());

        let blank = EnrollRequest::new("umum", " ");
        assert_eq!(blank.validate().unwrap_err(), "patient_ref cannot be empty");
    }

    #[test]
    fn test_event_serialization() {
        let event = QueueEvent::ChannelIdle {
            channel_id: "gigi".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "channel_idle");
        assert_eq!(json["channel_id"], "gigi");
        assert_eq!(event.channel_id(), "gigi");
        assert_eq!(event.event_type(), "channel_idle");
    }
}
