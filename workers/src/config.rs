//! Worker configuration.
//!
//! Values should come from the embedding process (environment, deployment
//! manifest), not be hardcoded. Defaults match the operational profile the
//! pipeline was tuned for: the materializer polls faster than the dispatcher
//! because follow-up actions are latency-sensitive while bus consumers are
//! not.

use std::time::Duration;

/// Configuration for the claim-and-dispatch worker.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum rows claimed per poll cycle.
    pub batch_size: usize,

    /// Sleep between poll cycles.
    ///
    /// Default: 15 seconds
    pub poll_interval: Duration,

    /// Attempts before an entry is terminally failed.
    ///
    /// Default: 5
    pub max_attempts: i32,
}

impl DispatchConfig {
    /// Create a configuration with the default operational profile.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(15),
            max_attempts: 5,
        }
    }

    /// Set the claim batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the claim-and-materialize worker.
#[derive(Debug, Clone)]
pub struct MaterializeConfig {
    /// Maximum rows claimed per poll cycle.
    pub batch_size: usize,

    /// Sleep between poll cycles.
    ///
    /// Default: 5 seconds
    pub poll_interval: Duration,

    /// Attempts before an entry is terminally failed.
    ///
    /// Default: 5
    pub max_attempts: i32,
}

impl MaterializeConfig {
    /// Create a configuration with the default operational profile.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(5),
            max_attempts: 5,
        }
    }

    /// Set the claim batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_profile() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.poll_interval, Duration::from_secs(15));
        assert_eq!(dispatch.max_attempts, 5);

        let materialize = MaterializeConfig::default();
        assert_eq!(materialize.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn builder_overrides() {
        let config = DispatchConfig::new()
            .with_batch_size(100)
            .with_poll_interval(Duration::from_millis(50))
            .with_max_attempts(3);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.max_attempts, 3);
    }
}
