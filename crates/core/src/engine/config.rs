//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{SkipPolicy, TransitionRules};

/// Configuration for the queue engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// What `skip` does with the called ticket.
    #[serde(default)]
    pub skip_policy: SkipPolicy,

    /// Require `begin_service` before `complete`.
    #[serde(default)]
    pub require_begin_service: bool,

    /// Average service time used for wait estimates until the channel has
    /// completed at least one ticket today.
    #[serde(default = "default_service_minutes")]
    pub default_service_minutes: f64,

    /// Offset from UTC, in minutes, used to decide the service date.
    /// Queue numbers restart at 1 on each new service date.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Capacity of the queue event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How many times a call_next reselects after losing a conditional update.
    #[serde(default = "default_call_attempts")]
    pub call_attempts: u32,

    #[serde(default)]
    pub store_retry: StoreRetryConfig,
}

/// Backoff policy for transient store failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRetryConfig {
    /// Total attempts, including the first (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_service_minutes() -> f64 {
    10.0
}

fn default_event_buffer() -> usize {
    256
}

fn default_call_attempts() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    50
}

fn default_max_backoff() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            skip_policy: SkipPolicy::default(),
            require_begin_service: false,
            default_service_minutes: default_service_minutes(),
            utc_offset_minutes: 0,
            event_buffer: default_event_buffer(),
            call_attempts: default_call_attempts(),
            store_retry: StoreRetryConfig::default(),
        }
    }
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl EngineConfig {
    pub fn transition_rules(&self) -> TransitionRules {
        TransitionRules {
            skip_policy: self.skip_policy,
            require_begin_service: self.require_begin_service,
        }
    }
}

impl StoreRetryConfig {
    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        self.initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}
