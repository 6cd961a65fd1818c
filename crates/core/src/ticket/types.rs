//! Core ticket data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Priority
// ============================================================================

/// Priority class of a ticket, fixed at enrollment.
///
/// Ordering follows service precedence: `Vip > Urgent > Normal`.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    #[default]
    Normal,
    Urgent,
    Vip,
}

impl PriorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::Normal => "normal",
            PriorityTier::Urgent => "urgent",
            PriorityTier::Vip => "vip",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(PriorityTier::Normal),
            "urgent" => Ok(PriorityTier::Urgent),
            "vip" => Ok(PriorityTier::Vip),
            other => Err(format!("unknown priority tier: {}", other)),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a ticket.
///
/// ```text
/// waiting -> called -> in_service -> completed
///    ^          |
///    +- skip ---+        (or called -> skipped -> waiting when parking)
/// any non-terminal -> cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// In the channel's waiting set.
    Waiting,
    /// Announced and holding the channel.
    Called,
    /// Patient is being served.
    InService,
    /// Served (terminal).
    Completed,
    /// Parked out of the waiting set after a skip.
    Skipped,
    /// Withdrawn (terminal).
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::Waiting,
        TicketStatus::Called,
        TicketStatus::InService,
        TicketStatus::Completed,
        TicketStatus::Skipped,
        TicketStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Called => "called",
            TicketStatus::InService => "in_service",
            TicketStatus::Completed => "completed",
            TicketStatus::Skipped => "skipped",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Completed | TicketStatus::Cancelled)
    }

    /// Returns true if the ticket occupies its channel.
    pub fn is_active(&self) -> bool {
        matches!(self, TicketStatus::Called | TicketStatus::InService)
    }

    /// Returns true if the ticket can be cancelled from this status.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown ticket status: {}", s))
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// One patient's queue entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Store-assigned unique ID.
    pub id: String,
    /// Owning channel.
    pub channel_id: String,
    /// Sequence number, unique per (channel, service date).
    pub queue_number: u32,
    /// Calendar day the queue number belongs to.
    pub service_date: NaiveDate,
    /// Opaque reference to the external patient record.
    pub patient_ref: String,
    pub priority_tier: PriorityTier,
    pub status: TicketStatus,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Last skip time. Set tickets sort behind never-skipped ones of their tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<DateTime<Utc>>,
    pub skip_count: u32,
    pub recall_count: u32,
    /// Derived on read, never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether the ticket was demoted by a skip.
    pub fn was_skipped(&self) -> bool {
        self.skipped_at.is_some()
    }

    /// Human-facing label, e.g. `UMU-007`.
    pub fn label(&self, channel_code: &str) -> String {
        format_queue_label(channel_code, self.queue_number)
    }

    /// Minutes spent serving this ticket, if it completed.
    pub fn service_minutes(&self) -> Option<f64> {
        let completed = self.completed_at?;
        let started = self.service_started_at.or(self.called_at)?;
        let secs = (completed - started).num_seconds().max(0);
        Some(secs as f64 / 60.0)
    }
}

/// Format a queue number with its channel prefix.
pub fn format_queue_label(channel_code: &str, queue_number: u32) -> String {
    format!("{}-{:03}", channel_code, queue_number)
}
