//! Runtime Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Time budget per frame for non-blocking elements (ms)
    pub frame_budget_ms: u64,

    /// Queue depth at which the non-blocking queue reports saturation
    pub frame_queue_high_water: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 16,
            frame_queue_high_water: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.frame_budget(), Duration::from_millis(16));
        assert_eq!(config.frame_queue_high_water, None);
    }

    #[test]
    fn test_partial_json() {
        let config = RuntimeConfig::from_json(r#"{ "frame_queue_high_water": 64 }"#).unwrap();
        assert_eq!(config.frame_budget_ms, 16);
        assert_eq!(config.frame_queue_high_water, Some(64));
    }
}
