//! Channel registry storage trait.

use thiserror::Error;

use super::{Channel, NewChannel, OperatingStatus};

/// Error type for channel storage operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    #[error("channel not found: {0}")]
    NotFound(String),

    #[error("channel already exists: {0}")]
    AlreadyExists(String),

    #[error("channel store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for channel registry backends.
pub trait ChannelStore: Send + Sync {
    /// Register a channel, initially `active`.
    fn create(&self, channel: NewChannel) -> Result<Channel, ChannelError>;

    /// Get a channel by ID.
    fn get(&self, id: &str) -> Result<Option<Channel>, ChannelError>;

    /// List all channels ordered by ID.
    fn list(&self) -> Result<Vec<Channel>, ChannelError>;

    /// Change a channel's operating status.
    fn set_operating_status(
        &self,
        id: &str,
        status: OperatingStatus,
    ) -> Result<Channel, ChannelError>;

    /// Enable or disable auto-call for a channel.
    fn set_auto_call(&self, id: &str, enabled: bool) -> Result<Channel, ChannelError>;
}
