//! Auto-call scheduler.
//!
//! Watches engine events and calls the next patient as soon as an
//! auto-call channel goes idle or gains a waiting ticket while idle. Calls go
//! through `QueueEngine::call_next`, so they serialize with operators
//! pressing "next" on the same channel.

mod config;
mod runner;

pub use config::AutoCallConfig;
pub use runner::AutoCaller;
