//! Ticket model and storage: one patient's queue entry per ticket.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTicketStore;
pub use store::{
    CreateTicketRequest, TicketError, TicketFilter, TicketStore, TicketUpdate, DEFAULT_LIST_LIMIT,
};
pub use types::{format_queue_label, PriorityTier, Ticket, TicketStatus};
