//! Configuration for the push engine.

use std::time::Duration;

/// Default pause between pushable items (60 items per minute)
pub const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_secs(1);
/// Default number of retries after a rate-limit signal
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default wait before the first retry; doubled on every further retry
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(60);
/// Longest failure reason surfaced to callers
pub const DEFAULT_REASON_MAX_CHARS: usize = 100;

/// Rate control settings for one push engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    /// Fixed wait before every pushable item except the first
    pub throttle_delay: Duration,
    /// Retries allowed per item, only for rate-limit failures
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Failure reasons are cut to this many characters
    pub reason_max_chars: usize,
}

impl PushConfig {
    /// Sets the inter-item throttle delay.
    #[must_use]
    pub const fn with_throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }

    /// Sets the number of rate-limit retries per item.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first backoff wait.
    #[must_use]
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Backoff before retry number `retry` (0-indexed): `initial * 2^retry`.
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
    }

    /// Total attempts per item, first try included.
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            throttle_delay: DEFAULT_THROTTLE_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            reason_max_chars: DEFAULT_REASON_MAX_CHARS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_schedule() {
        let config = PushConfig::default();
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.backoff_for_retry(0), Duration::from_secs(60));
        assert_eq!(config.backoff_for_retry(1), Duration::from_secs(120));
        assert_eq!(config.backoff_for_retry(2), Duration::from_secs(240));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = PushConfig::default()
            .with_throttle_delay(Duration::from_millis(250))
            .with_max_retries(1)
            .with_initial_backoff(Duration::from_secs(5));

        assert_eq!(config.throttle_delay, Duration::from_millis(250));
        assert_eq!(config.max_attempts(), 2);
        assert_eq!(config.backoff_for_retry(1), Duration::from_secs(10));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let config = PushConfig::default().with_initial_backoff(Duration::MAX);
        assert_eq!(config.backoff_for_retry(40), Duration::MAX);
    }
}
