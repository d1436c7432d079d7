use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `OUTREACH__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub vendor: VendorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks. A tunable, not a correctness
    /// constraint: a missed tick just delays pickup to the next one.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Recipients dispatched concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds between progress-feed pushes.
    #[serde(default = "default_progress_poll_secs")]
    pub progress_poll_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Probability that an accepted call is ultimately marked sent.
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    /// Probability that the outbound call itself errors.
    #[serde(default)]
    pub call_failure_rate: f64,
    /// Fixed RNG seed for reproducible simulation; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tick_interval_secs() -> u64 {
    60
}
fn default_batch_size() -> usize {
    50
}
fn default_progress_poll_secs() -> u64 {
    5
}
fn default_success_rate() -> f64 {
    0.9
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            progress_poll_secs: default_progress_poll_secs(),
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            success_rate: default_success_rate(),
            call_failure_rate: 0.0,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("OUTREACH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.delivery.batch_size, 50);
        assert!((config.vendor.success_rate - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.vendor.call_failure_rate, 0.0);
        assert!(config.vendor.seed.is_none());
    }
}
