//! Retry policy for transient dispatch failures.
//!
//! Exponential backoff with jitter and a hard attempt cap. A job whose
//! attempts are exhausted becomes terminally failed; the policy itself
//! never touches job state.

use std::time::Duration;

use rand::Rng;

/// Default maximum dispatch attempts per job (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default exponential growth factor.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Jitter range applied to the computed delay: `delay * (1 ± JITTER)`.
const JITTER: f64 = 0.5;

/// Backoff / attempt-cap policy shared by the dispatcher.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Whether a job that has already used `attempt_count` attempts may be
    /// dispatched again.
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Deterministic backoff for the retry following attempt `attempt_count`
    /// (1-based: after the first failed attempt pass 1). Capped at
    /// `max_delay`.
    pub fn backoff(&self, attempt_count: u32) -> Duration {
        let exp = attempt_count.saturating_sub(1).min(32);
        let delay = self.base_delay.as_secs_f64() * self.factor.powi(exp as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// [`backoff`](Self::backoff) with ±50% jitter applied, so simultaneous
    /// failures do not retry in lockstep.
    pub fn backoff_jittered(&self, attempt_count: u32) -> Duration {
        let base = self.backoff(attempt_count).as_secs_f64();
        let spread = rand::rng().random_range(1.0 - JITTER..=1.0 + JITTER);
        Duration::from_secs_f64((base * spread).min(self.max_delay.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_allowed_below_cap() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_capped_at_max_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(30), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn jittered_backoff_stays_in_band() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.backoff_jittered(2).as_secs_f64();
            assert!((0.5..=1.5).contains(&d), "jittered delay {d} out of band");
        }
    }
}
