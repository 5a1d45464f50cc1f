//! Configuration for the sync engine.
//!
//! All intervals are `std::time::Duration`; converting from caller-side
//! units (minutes, seconds) happens at the caller's config boundary,
//! never inside the engine.

use localsync_protocol::ResolutionStrategy;
use std::time::Duration;

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Idle wait between periodic sync cycles.
    pub sync_interval: Duration,
    /// Maximum queue items processed per cycle.
    pub batch_size: usize,
    /// Maximum failed attempts before a queue item is abandoned.
    pub max_retries: u32,
    /// Whether cycles use the bulk-sync endpoint instead of per-item calls.
    pub use_bulk: bool,
    /// Request timeout for remote calls.
    pub request_timeout: Duration,
    /// Conflict resolution strategy.
    pub strategy: ResolutionStrategy,
    /// Backoff applied to the idle wait on consecutive cycle failures.
    pub backoff: BackoffConfig,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            batch_size: 50,
            max_retries: 5,
            use_bulk: false,
            request_timeout: Duration::from_secs(30),
            strategy: ResolutionStrategy::LastWriteWins,
            backoff: BackoffConfig::default(),
        }
    }

    /// Sets the periodic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the per-cycle batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the per-item retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Enables or disables bulk-sync cycles.
    pub fn with_bulk(mut self, use_bulk: bool) -> Self {
        self.use_bulk = use_bulk;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the conflict resolution strategy.
    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the failure backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff applied to the loop's idle wait while cycles keep failing.
///
/// The first failure shortens the wait to `initial_delay` so transient
/// outages recover quickly; each further failure doubles it (by
/// `multiplier`) up to `max_delay`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Wait after the first failed cycle.
    pub initial_delay: Duration,
    /// Upper bound for the backed-off wait.
    pub max_delay: Duration,
    /// Multiplier per additional consecutive failure.
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl BackoffConfig {
    /// Calculates the wait for a consecutive-failure streak (1-indexed).
    ///
    /// A streak of zero means the last cycle succeeded; callers should
    /// use the regular sync interval in that case.
    pub fn delay_for_streak(&self, streak: u32) -> Duration {
        if streak == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.multiplier.powi(streak.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter so fleets of clients do not thunder in step
            let jitter = capped * 0.25 * time_jitter();
            Duration::from_secs_f64(capped + jitter)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            add_jitter: true,
        }
    }
}

/// Simple time-derived jitter in [0, 1) (no external RNG dependency).
fn time_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = EngineConfig::new()
            .with_sync_interval(Duration::from_secs(60))
            .with_batch_size(10)
            .with_max_retries(3)
            .with_bulk(true)
            .with_strategy(ResolutionStrategy::AcceptRemote);

        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_retries, 3);
        assert!(config.use_bulk);
        assert_eq!(config.strategy, ResolutionStrategy::AcceptRemote);
    }

    #[test]
    fn backoff_grows_with_streak() {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            add_jitter: false,
        };

        assert_eq!(backoff.delay_for_streak(0), Duration::ZERO);
        assert_eq!(backoff.delay_for_streak(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_streak(2), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_streak(4), Duration::from_secs(40));
    }

    #[test]
    fn backoff_respects_max() {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 10.0,
            add_jitter: false,
        };

        assert_eq!(backoff.delay_for_streak(10), Duration::from_secs(60));
    }

    #[test]
    fn backoff_jitter_bounded() {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            add_jitter: true,
        };

        let delay = backoff.delay_for_streak(1);
        assert!(delay >= Duration::from_secs(4));
        assert!(delay <= Duration::from_secs(5));
    }
}
