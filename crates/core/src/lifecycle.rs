//! Ticket lifecycle rules.
//!
//! Every mutating operation is planned here before it touches the store: the
//! planner checks the precondition against the ticket as last read and returns
//! the status the store must still hold plus the fields to write. The engine
//! then applies the plan with a single conditional update, so a transition is
//! either fully committed or not at all.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ticket::{Ticket, TicketStatus, TicketUpdate};

/// What happens to a called ticket when the operator skips it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipPolicy {
    /// Back to `waiting`, behind every never-skipped ticket of its tier.
    #[default]
    Requeue,
    /// Out of the waiting set (`skipped`) until explicitly requeued.
    Park,
}

/// Channel-wide knobs that change which transitions are legal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionRules {
    pub skip_policy: SkipPolicy,
    /// Reject `called -> completed` without a `begin_service` step.
    pub require_begin_service: bool,
}

/// Operations that act on an existing ticket by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    Recall,
    BeginService,
    Complete,
    Skip,
    Requeue,
    Cancel,
}

impl TicketAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketAction::Recall => "recall",
            TicketAction::BeginService => "begin_service",
            TicketAction::Complete => "complete",
            TicketAction::Skip => "skip",
            TicketAction::Requeue => "requeue",
            TicketAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for TicketAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ticket is not in a state that allows the operation.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot {operation} ticket {ticket_id}: ticket is {status}")]
pub struct InvalidTransition {
    pub ticket_id: String,
    pub status: TicketStatus,
    pub operation: &'static str,
}

/// A checked transition, ready for a conditional store update.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Status the stored ticket must still have.
    pub expected: TicketStatus,
    pub update: TicketUpdate,
}

impl Transition {
    /// Whether committing this leaves the ticket's channel without a current ticket.
    pub fn releases_channel(&self) -> bool {
        self.expected.is_active() && !self.update.status.is_active()
    }

    /// Whether the patient should be (re-)announced after commit.
    pub fn announces(&self) -> bool {
        self.update.status == TicketStatus::Called
    }
}

/// Plan `waiting -> called` for the ticket chosen by the scheduler.
pub fn plan_call(ticket: &Ticket, now: DateTime<Utc>) -> Result<Transition, InvalidTransition> {
    require(ticket, "call_next", |s| s == TicketStatus::Waiting)?;
    Ok(Transition {
        expected: TicketStatus::Waiting,
        update: TicketUpdate::to(TicketStatus::Called).called_at(now),
    })
}

/// Plan one of the per-ticket operations.
pub fn plan(
    action: TicketAction,
    ticket: &Ticket,
    rules: TransitionRules,
    now: DateTime<Utc>,
) -> Result<Transition, InvalidTransition> {
    let op = action.as_str();
    let current = ticket.status;

    let update = match action {
        TicketAction::Recall => {
            require(ticket, op, |s| s.is_active())?;
            TicketUpdate::to(current).called_at(now).increment_recall()
        }
        TicketAction::BeginService => {
            require(ticket, op, |s| s == TicketStatus::Called)?;
            TicketUpdate::to(TicketStatus::InService).service_started_at(now)
        }
        TicketAction::Complete => {
            require(ticket, op, |s| match s {
                TicketStatus::InService => true,
                TicketStatus::Called => !rules.require_begin_service,
                _ => false,
            })?;
            TicketUpdate::to(TicketStatus::Completed).completed_at(now)
        }
        TicketAction::Skip => {
            require(ticket, op, |s| s == TicketStatus::Called)?;
            let target = match rules.skip_policy {
                SkipPolicy::Requeue => TicketStatus::Waiting,
                SkipPolicy::Park => TicketStatus::Skipped,
            };
            TicketUpdate::to(target).skipped_at(now).increment_skip()
        }
        TicketAction::Requeue => {
            require(ticket, op, |s| s == TicketStatus::Skipped)?;
            TicketUpdate::to(TicketStatus::Waiting).skipped_at(now)
        }
        TicketAction::Cancel => {
            require(ticket, op, |s| s.can_cancel())?;
            TicketUpdate::to(TicketStatus::Cancelled).cancelled_at(now)
        }
    };

    Ok(Transition {
        expected: current,
        update,
    })
}

fn require(
    ticket: &Ticket,
    operation: &'static str,
    allowed: impl Fn(TicketStatus) -> bool,
) -> Result<(), InvalidTransition> {
    if allowed(ticket.status) {
        Ok(())
    } else {
        Err(InvalidTransition {
            ticket_id: ticket.id.clone(),
            status: ticket.status,
            operation,
        })
    }
}
