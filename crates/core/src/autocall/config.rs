//! Auto-call configuration.

use serde::{Deserialize, Serialize};

/// Global switch for the auto-caller. Channels opt in individually with
/// their `auto_call` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCallConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for AutoCallConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}
