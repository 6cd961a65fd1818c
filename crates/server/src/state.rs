use std::sync::Arc;

use antrian_core::{AutoCaller, Config, QueueEngine, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<QueueEngine>,
    auto_caller: Option<Arc<AutoCaller>>,
}

impl AppState {
    pub fn new(
        config: Config,
        engine: Arc<QueueEngine>,
        auto_caller: Option<Arc<AutoCaller>>,
    ) -> Self {
        Self {
            config,
            engine,
            auto_caller,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &QueueEngine {
        self.engine.as_ref()
    }

    pub fn auto_caller(&self) -> Option<&Arc<AutoCaller>> {
        self.auto_caller.as_ref()
    }
}
