//! Priority scheduling: which waiting ticket is served next.
//!
//! Ordering rules:
//! - tier precedence `vip > urgent > normal`;
//! - within a tier, never-skipped tickets first, by `enqueued_at`;
//! - skipped tickets after them, by `skipped_at` (their `enqueued_at` is kept
//!   but no longer decides position);
//! - `queue_number`, then `id`, break remaining ties.
//!
//! Everything here is pure and safe to call from any task.

use std::cmp::Ordering;

use crate::ticket::{Ticket, TicketStatus};

/// Total order over waiting tickets, earliest-served first.
pub fn service_order(a: &Ticket, b: &Ticket) -> Ordering {
    b.priority_tier
        .cmp(&a.priority_tier)
        .then_with(|| match (a.skipped_at, b.skipped_at) {
            (None, None) => a.enqueued_at.cmp(&b.enqueued_at),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        })
        .then_with(|| a.queue_number.cmp(&b.queue_number))
        .then_with(|| a.id.cmp(&b.id))
}

/// Select the next ticket to call, ignoring anything not `waiting`.
pub fn select_next(tickets: &[Ticket]) -> Option<&Ticket> {
    tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Waiting)
        .min_by(|a, b| service_order(a, b))
}

/// Waiting tickets in the order they will be called.
pub fn order_queue(tickets: impl IntoIterator<Item = Ticket>) -> Vec<Ticket> {
    let mut queue: Vec<Ticket> = tickets
        .into_iter()
        .filter(|t| t.status == TicketStatus::Waiting)
        .collect();
    queue.sort_by(service_order);
    queue
}

/// Mean service duration over completed tickets, in minutes.
pub fn average_service_minutes<'a>(completed: impl IntoIterator<Item = &'a Ticket>) -> Option<f64> {
    let (sum, n) = completed
        .into_iter()
        .filter_map(Ticket::service_minutes)
        .fold((0.0, 0usize), |(sum, n), m| (sum + m, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Fill `estimated_wait_minutes` on an ordered queue.
///
/// The ticket at position `p` waits for the `p` tickets ahead of it, plus the
/// one in service when the channel is busy.
pub fn estimate_waits(queue: &mut [Ticket], channel_busy: bool, avg_service_minutes: f64) {
    let ahead_offset = usize::from(channel_busy);
    for (position, ticket) in queue.iter_mut().enumerate() {
        let ahead = (position + ahead_offset) as f64;
        ticket.estimated_wait_minutes = Some((ahead * avg_service_minutes).ceil() as u32);
    }
}
