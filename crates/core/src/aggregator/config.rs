//! Aggregator configuration.

use std::time::Duration;

use crate::config::AggregatorSettings;

/// Runtime configuration for the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// How long to wait for the slow source once every fast source answered.
    /// The slow source keeps running afterwards so its cache entry still lands.
    pub grace_period: Duration,

    /// Extra attempts for sources that support retrying.
    pub retries: u32,
}

impl AggregatorConfig {
    /// Attempts handed to retry-capable sources.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::from(&AggregatorSettings::default())
    }
}

impl From<&AggregatorSettings> for AggregatorConfig {
    fn from(settings: &AggregatorSettings) -> Self {
        Self {
            grace_period: Duration::from_millis(settings.grace_period_ms),
            retries: settings.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AggregatorConfig::default();
        assert_eq!(config.grace_period, Duration::from_secs(1));
        assert_eq!(config.retries, 1);
        assert_eq!(config.attempts(), 2);
    }

    #[test]
    fn test_attempts_saturate() {
        let config = AggregatorConfig {
            grace_period: Duration::ZERO,
            retries: u32::MAX,
        };
        assert_eq!(config.attempts(), u32::MAX);
    }
}
