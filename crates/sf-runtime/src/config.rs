use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub callback_capacity: usize,
    pub endpoint_timeout_secs: u64,
    pub version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
            callback_capacity: 1000,
            endpoint_timeout_secs: 10,
            version: DEFAULT_ENGINE_VERSION.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint_timeout_secs)
    }
}
