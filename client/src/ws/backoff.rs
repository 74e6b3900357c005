//! Reconnect backoff policy.

use std::time::Duration;

use super::config::ManagerConfig;

/// Exponential reconnect backoff: `min(base * 2^attempts, max_delay)`,
/// bounded by a maximum number of consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl ReconnectBackoff {
    /// Creates a new backoff policy.
    #[must_use]
    pub const fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
        }
    }

    /// Builds the policy from a manager configuration.
    #[must_use]
    pub const fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            config.reconnect_interval,
            config.max_reconnect_delay,
            config.max_reconnect_attempts,
        )
    }

    /// Returns the maximum number of consecutive attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calculates the delay after `attempts` consecutive failures.
    #[must_use]
    pub fn delay(&self, attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max_delay)
    }

    /// Returns the delay before the next attempt, or `None` once the
    /// attempt budget is spent.
    #[must_use]
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.max_attempts {
            None
        } else {
            Some(self.delay(attempts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectBackoff {
        ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 50)
    }

    #[test]
    fn test_delay_doubles() {
        let backoff = policy();
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(4), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_capped() {
        let backoff = policy();
        assert_eq!(backoff.delay(5), Duration::from_secs(30));
        assert_eq!(backoff.delay(49), Duration::from_secs(30));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_non_decreasing() {
        let backoff = policy();
        let delays: Vec<Duration> = (0..60).map(|n| backoff.delay(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_next_delay_exhausted() {
        let backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(30), 3);
        assert_eq!(backoff.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(2), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(3), None);
    }

    #[test]
    fn test_from_config() {
        let config = ManagerConfig::default()
            .with_reconnect_interval(Duration::from_millis(500))
            .with_max_reconnect_attempts(7);
        let backoff = ReconnectBackoff::from_config(&config);
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.max_attempts(), 7);
    }
}
