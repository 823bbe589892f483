//! Broker configuration from the environment.

use std::str::FromStr;
use std::time::Duration;

use relay_core::BackoffPolicy;

/// Runtime knobs for the lease engine, dispatcher, ticker, and outbox.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Lease duration when a poll does not request one.
    pub default_lease_timeout_seconds: i64,
    /// Ceiling on live leases across all tenants.
    pub global_concurrency_cap: i64,
    /// Shared-mode redraws when the fairness step and the claim step race.
    pub dispatch_retry_limit: u32,
    pub ticker_interval: Duration,
    pub outbox_interval: Duration,
    pub outbox_batch_size: i64,
    /// 64-bit advisory-lock key for leader election.
    pub leader_lock_key: i64,
    pub reaper_batch_limit: i64,
    pub backoff: BackoffPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_lease_timeout_seconds: 30,
            global_concurrency_cap: 100,
            dispatch_retry_limit: 3,
            ticker_interval: Duration::from_secs(10),
            outbox_interval: Duration::from_secs(1),
            outbox_batch_size: 50,
            leader_lock_key: 84_728_472,
            reaper_batch_limit: 100,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BrokerConfig {
    /// Read configuration from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backoff = BackoffPolicy {
            base_delay_seconds: env_or("RETRY_BASE_DELAY_SECONDS", 10),
            max_delay_seconds: env_or("RETRY_MAX_DELAY_SECONDS", 3600),
            jitter: env_or("RETRY_JITTER", true),
        };
        Self {
            default_lease_timeout_seconds: env_or(
                "DEFAULT_LEASE_TIMEOUT_SECONDS",
                defaults.default_lease_timeout_seconds,
            ),
            global_concurrency_cap: env_or(
                "GLOBAL_CONCURRENCY_CAP",
                defaults.global_concurrency_cap,
            ),
            dispatch_retry_limit: env_or("DISPATCH_RETRY_LIMIT", defaults.dispatch_retry_limit),
            ticker_interval: Duration::from_secs(env_or("TICKER_INTERVAL_SECONDS", 10)),
            outbox_interval: Duration::from_secs(env_or("OUTBOX_INTERVAL_SECONDS", 1)),
            outbox_batch_size: env_or("OUTBOX_BATCH_SIZE", defaults.outbox_batch_size),
            leader_lock_key: env_or("LEADER_LOCK_KEY", defaults.leader_lock_key),
            reaper_batch_limit: env_or("REAPER_BATCH_LIMIT", defaults.reaper_batch_limit),
            backoff,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok(), default)
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_uses_default_when_unset() {
        assert_eq!(parse_or::<i64>(None, 30), 30);
    }

    #[test]
    fn parse_or_uses_default_on_garbage() {
        assert_eq!(parse_or(Some("not a number".to_string()), 100), 100);
        assert_eq!(parse_or(Some("".to_string()), 5), 5);
    }

    #[test]
    fn parse_or_accepts_valid_values() {
        assert_eq!(parse_or(Some("42".to_string()), 0), 42);
        assert!(parse_or(Some("true".to_string()), false));
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = BrokerConfig::default();
        assert!(cfg.dispatch_retry_limit >= 3);
        assert_eq!(cfg.ticker_interval, Duration::from_secs(10));
        assert_eq!(cfg.outbox_interval, Duration::from_secs(1));
        assert_eq!(cfg.outbox_batch_size, 50);
    }
}
