use std::time;

/// The retry policy used by `CapiClient` to bound and pace delivery
/// attempts against transport failures.
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts before a transport failure is terminal.
    max_attempts: u32,
    /// Base delay, multiplied by the attempt number for a linear backoff.
    base_interval: time::Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_interval: time::Duration) -> Self {
        Self {
            // A policy that never attempts anything is a configuration
            // mistake; clamp rather than fail.
            max_attempts: max_attempts.max(1),
            base_interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the given (1-based) attempt may be followed by another.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt` failures.
    pub fn retry_interval(&self, attempt: u32) -> time::Duration {
        self.base_interval * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_interval: time::Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::new(3, time::Duration::from_millis(500));

        assert_eq!(policy.retry_interval(1), time::Duration::from_millis(500));
        assert_eq!(policy.retry_interval(2), time::Duration::from_millis(1000));
        assert_eq!(policy.retry_interval(3), time::Duration::from_millis(1500));
    }

    #[test]
    fn retries_stop_at_the_attempt_ceiling() {
        let policy = RetryPolicy::new(3, time::Duration::from_millis(1));

        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, time::Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);
    }
}
