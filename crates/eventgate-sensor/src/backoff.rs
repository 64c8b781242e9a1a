//! Bounded exponential backoff for conflict retries.
//!
//! The delay before retry `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`. After `steps` retries the caller gives up and surfaces the last
//! error.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Cap on any single delay.
    pub max: Duration,
    /// Multiplicative growth per retry.
    pub factor: f64,
    /// Number of retries after the initial attempt.
    pub steps: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(10),
            max: Duration::from_secs(1),
            factor: 2.0,
            steps: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Whether another retry is allowed after `attempt` retries.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially() {
        let policy = RetryPolicy {
            first: Duration::from_millis(10),
            max: Duration::from_secs(1),
            factor: 2.0,
            steps: 5,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(80));
    }

    #[test]
    fn clamped_to_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(20), Duration::from_secs(1));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let policy = RetryPolicy {
            first: Duration::from_secs(5),
            max: Duration::from_secs(2),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_secs(2));
    }

    #[test]
    fn steps_bound_retries() {
        let policy = RetryPolicy {
            steps: 2,
            ..RetryPolicy::default()
        };
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }
}
