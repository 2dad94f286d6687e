//! Exponential retry delay.

use std::time::Duration;

/// Retry delay policy: `base ^ attempt` seconds.
///
/// Delays strictly increase for every attempt where `base ^ attempt` fits in
/// a `u64` (attempts up to 16 for base 15), see [`Backoff::max_attempt`].
/// Past that point the delay is capped at `u64::MAX` seconds and stays flat.
/// Config validation keeps `max_retries` inside the increasing range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: u64,
}

impl Backoff {
    pub fn new(base: u64) -> Self {
        Self { base }
    }

    /// Largest attempt whose delay is still exact, so `delay(n + 1) > delay(n)`
    /// holds for every `n <= max_attempt()`.
    pub fn max_attempt(&self) -> u32 {
        if self.base < 2 {
            return u32::MAX;
        }
        let mut attempt = 0u32;
        while self.base.checked_pow(attempt + 1).is_some() {
            attempt += 1;
        }
        attempt
    }

    /// Delay before redelivering a message that has been attempted `attempt` times.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base.saturating_pow(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_values() {
        let backoff = Backoff::new(15);
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(15));
        assert_eq!(backoff.delay(2), Duration::from_secs(225));
    }

    #[test]
    fn test_delay_strictly_increasing() {
        for base in [2, 3, 15] {
            let backoff = Backoff::new(base);
            for n in 0..10 {
                assert!(backoff.delay(n + 1) > backoff.delay(n), "base {base}, attempt {n}");
            }
        }
    }

    #[test]
    fn test_delay_saturates() {
        let backoff = Backoff::new(15);
        assert_eq!(backoff.delay(100), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_increasing_up_to_max_attempt_then_capped() {
        let backoff = Backoff::new(15);
        assert_eq!(backoff.max_attempt(), 16);

        for n in 0..=backoff.max_attempt() {
            assert!(backoff.delay(n + 1) > backoff.delay(n), "attempt {n}");
        }
        assert_eq!(backoff.delay(17), Duration::from_secs(u64::MAX));
        assert_eq!(backoff.delay(18), backoff.delay(17));
    }

    #[test]
    fn test_max_attempt_for_base_two() {
        assert_eq!(Backoff::new(2).max_attempt(), 63);
    }
}
