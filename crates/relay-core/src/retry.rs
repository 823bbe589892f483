//! Exponential backoff for job retries.

use chrono::Duration;
use rand::Rng;

/// Backoff policy applied between failed attempts of a job.
///
/// The delay doubles per attempt, capped at `max_delay_seconds`. The first
/// retry waits `base_delay_seconds`. Jitter adds up to 10% so that a shared
/// downstream failure does not produce a synchronized retry storm.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_seconds: 10,
            max_delay_seconds: 3600,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry that follows failure number `attempt`
    /// (1-based: `attempt = 1` means "we failed once").
    pub fn delay(&self, attempt: i32) -> Duration {
        // Exponent capped at 20: past that the doubling has long since hit
        // max_delay and u64 arithmetic must not overflow.
        let exp = (attempt.max(1) - 1).min(20) as u32;
        let base = self
            .base_delay_seconds
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_seconds);

        let mut secs = base as f64;
        if self.jitter {
            secs += rand::rng().random_range(0.0..=base as f64 * 0.1);
        }
        Duration::milliseconds((secs * 1000.0) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> BackoffPolicy {
        BackoffPolicy {
            base_delay_seconds: 10,
            max_delay_seconds: 3600,
            jitter,
        }
    }

    #[test]
    fn first_retry_waits_base_delay() {
        assert_eq!(policy(false).delay(1), Duration::seconds(10));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = policy(false);
        assert_eq!(p.delay(2), Duration::seconds(20));
        assert_eq!(p.delay(3), Duration::seconds(40));
        assert_eq!(p.delay(4), Duration::seconds(80));
    }

    #[test]
    fn delay_is_monotonic_and_capped() {
        let p = policy(false);
        let mut prev = Duration::zero();
        for attempt in 1..64 {
            let d = p.delay(attempt);
            assert!(d >= prev, "delay shrank at attempt {attempt}");
            assert!(d <= Duration::seconds(3600));
            prev = d;
        }
        assert_eq!(p.delay(63), Duration::seconds(3600));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        assert_eq!(policy(false).delay(i32::MAX), Duration::seconds(3600));
        assert_eq!(policy(false).delay(-5), Duration::seconds(10));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let p = policy(true);
        for _ in 0..200 {
            let d = p.delay(3);
            assert!(d >= Duration::seconds(40));
            assert!(d <= Duration::milliseconds(44_000));
        }
    }
}
