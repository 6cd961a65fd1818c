//! Channel registry: service points, their operating status and auto-call flag.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteChannelStore;
pub use store::{ChannelError, ChannelStore};
pub use types::{Channel, NewChannel, OperatingStatus};
