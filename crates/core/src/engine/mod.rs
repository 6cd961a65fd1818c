//! Queue engine: the single entry point for queue operations.
//!
//! - Channel operations (`call_next`, settings) and ticket transitions are
//!   serialized per channel
//! - Enrollment only appends and runs without the channel lock
//! - Reads (`channel_view`, `queue`, `ticket`) are recomputed from the store
//! - Committed changes are published as [`QueueEvent`]s

mod config;
mod runner;
mod types;

pub use config::{EngineConfig, StoreRetryConfig};
pub use runner::QueueEngine;
pub use types::{ChannelView, EngineError, EnrollRequest, QueueEvent};
