//! Configuration for the Filter domain

use std::time::Duration;

use rhythm_sandbox::SandboxLimits;
use rhythm_transport::EndpointConfig;
use serde::{Deserialize, Serialize};

/// Filter domain configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Timing of the kindred gate and per-hook budgets
    #[serde(default)]
    pub timing: TimingConfig,

    /// Script engine limits
    #[serde(default)]
    pub limits: SandboxLimits,

    /// Transport timeouts
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long a run waits for kindred data
    #[serde(default = "default_kindred_timeout_ms")]
    pub kindred_timeout_ms: u64,

    /// Wall-clock budget for a single hook call
    #[serde(default = "default_item_timeout_ms")]
    pub item_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            kindred_timeout_ms: default_kindred_timeout_ms(),
            item_timeout_ms: default_item_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn kindred_timeout(&self) -> Duration {
        Duration::from_millis(self.kindred_timeout_ms)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

fn default_kindred_timeout_ms() -> u64 {
    10_000
}

fn default_item_timeout_ms() -> u64 {
    2_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_sections_default_independently() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"timing": {"item_timeout_ms": 50}}"#).unwrap();
        assert_eq!(config.timing.item_timeout(), Duration::from_millis(50));
        assert_eq!(config.timing.kindred_timeout_ms, 10_000);
        assert_eq!(config.endpoint.request_timeout_ms, 10_000);
        assert_eq!(config.limits.max_posts, 1_000);
    }
}
