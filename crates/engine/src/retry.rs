//! Bounded retry policy for the apply loop.

use std::env;
use std::time::Duration;

const DEFAULT_CONFLICT_RETRIES: u32 = 5;
const DEFAULT_TRANSIENT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 50;
const DEFAULT_BACKOFF_CAP_MS: u64 = 2_000;

/// How the engine retries the two recoverable failure modes.
///
/// Version conflicts are retried immediately with a fresh projection read;
/// transient storage failures are retried with exponential backoff. Business
/// errors are never retried. Both budgets are small and bounded so a stuck
/// store surfaces as an error instead of an unbounded stall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fresh-read retries after an optimistic version conflict.
    pub max_conflict_retries: u32,
    /// Total attempts against a transiently unavailable store.
    pub transient_attempts: u32,
    /// First backoff sleep; doubles per transient attempt.
    pub backoff_base: Duration,
    /// Upper bound on a single backoff sleep.
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_CONFLICT_RETRIES,
            transient_attempts: DEFAULT_TRANSIENT_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy from `FISHDOCK_*` environment overrides, defaults otherwise.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_conflict_retries: parse(&lookup, "FISHDOCK_CONFLICT_RETRIES")
                .unwrap_or(defaults.max_conflict_retries),
            transient_attempts: parse::<u32>(&lookup, "FISHDOCK_TRANSIENT_ATTEMPTS")
                .map(|n| n.max(1))
                .unwrap_or(defaults.transient_attempts),
            backoff_base: parse(&lookup, "FISHDOCK_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_cap: parse(&lookup, "FISHDOCK_BACKOFF_CAP_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_cap),
        }
    }

    /// Sleep before transient attempt `attempt` (zero-based): base doubled
    /// per attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

fn parse<T: std::str::FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key)?.trim().parse().ok()
}
