//! Sliding-window admission decisions.
//!
//! The evaluator is a pure function of the clock, the store and the
//! config. It never fails: a request is either admitted or rejected, and a
//! rejection is a normal [`RateLimitResult`], not an error.
//!
//! The read-prune-append sequence for one identifier is not atomic. Two
//! requests racing on the same key within the same instant may both be
//! admitted. That is acceptable for abuse prevention and keeps the hot path
//! free of per-key locks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::policy::RateLimitConfig;
use super::store::{InMemoryWindowStore, WindowStore};

/// How often the request path may trigger a global sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Effective limit after the tier multiplier, clamped at zero
    pub limit: u64,
    pub remaining: u64,
    /// Unix millis when the oldest counted request leaves the window
    pub reset_at: u64,
    /// Seconds; 0 when allowed
    pub retry_after: u64,
}

impl RateLimitResult {
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at / 1000
    }
}

/// Rate limiter over an injectable [`WindowStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    sweep_interval_ms: u64,
    last_sweep_ms: Arc<AtomicU64>,
    // longest window any check has used, the sweep horizon
    longest_window_ms: Arc<AtomicU64>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryWindowStore::new()), DEFAULT_SWEEP_INTERVAL)
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, sweep_interval: Duration) -> Self {
        Self {
            store,
            sweep_interval_ms: sweep_interval.as_millis() as u64,
            last_sweep_ms: Arc::new(AtomicU64::new(0)),
            longest_window_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seeds the sweep horizon, so a sweep never evicts timestamps that a
    /// longer-window class has not checked yet since startup.
    pub fn with_longest_window(self, window: Duration) -> Self {
        self.longest_window_ms
            .fetch_max(window.as_millis() as u64, Ordering::Relaxed);
        self
    }

    pub fn store(&self) -> &dyn WindowStore {
        self.store.as_ref()
    }

    /// Checks `identifier` against `config` at the current wall-clock time.
    pub fn check(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
        tier: Option<&str>,
    ) -> RateLimitResult {
        self.check_at(identifier, config, tier, now_ms())
    }

    /// Same as [`check`](Self::check) with an explicit "now" in unix millis.
    pub fn check_at(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
        tier: Option<&str>,
        now: u64,
    ) -> RateLimitResult {
        let window_ms = config.window_ms();
        let window_start = now.saturating_sub(window_ms);

        self.longest_window_ms
            .fetch_max(window_ms, Ordering::Relaxed);
        self.maybe_sweep(now);

        let effective_limit = config.effective_limit(tier);

        let view = self.store.prune(identifier, window_start);
        let current = view.count as i64;
        let allowed = current < effective_limit;

        if allowed {
            self.store.record(identifier, now);
        }

        // saturating: a non-finite multiplier floors to i64::MIN
        let remaining = effective_limit
            .saturating_sub(current)
            .saturating_sub(i64::from(allowed))
            .max(0) as u64;
        // an empty window was just filled by `now`, or stays empty on reject
        let reset_at = view.oldest.unwrap_or(now) + window_ms;
        let retry_after = if allowed {
            0
        } else {
            reset_at.saturating_sub(now).div_ceil(1000).max(1)
        };

        RateLimitResult {
            allowed,
            limit: effective_limit.max(0) as u64,
            remaining,
            reset_at,
            retry_after,
        }
    }

    /// Sweeps if the interval has elapsed since the last sweep. Only one
    /// caller wins the race for a given interval.
    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.sweep_interval_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep_at(now);
        }
    }

    /// Unconditional sweep, for a background task.
    pub fn sweep_now(&self) -> usize {
        let now = now_ms();
        self.last_sweep_ms.store(now, Ordering::Relaxed);
        self.sweep_at(now)
    }

    fn sweep_at(&self, now: u64) -> usize {
        let horizon = self.longest_window_ms.load(Ordering::Relaxed);
        let removed = self.store.sweep(now.saturating_sub(horizon));
        debug!(
            removed,
            remaining = self.store.len(),
            "rate limiter sweep completed"
        );
        removed
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1000;
    const T0: u64 = 1_700_000_000_000;

    fn limiter() -> RateLimiter {
        RateLimiter::default()
    }

    #[test]
    fn admits_first_five_then_rejects() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(5);

        let remaining: Vec<u64> = (0..5)
            .map(|i| {
                let res = limiter.check_at("ip:1.2.3.4", &cfg, None, T0 + i * SEC);
                assert!(res.allowed);
                assert_eq!(res.retry_after, 0);
                res.remaining
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let sixth = limiter.check_at("ip:1.2.3.4", &cfg, None, T0 + 5 * SEC);
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.retry_after, 55);
        assert_eq!(sixth.reset_at, T0 + 60 * SEC);
    }

    #[test]
    fn other_identifier_is_unaffected() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(5);
        for i in 0..6 {
            limiter.check_at("ip:1.2.3.4", &cfg, None, T0 + i * SEC);
        }

        let res = limiter.check_at("ip:9.9.9.9", &cfg, None, T0 + 6 * SEC);
        assert!(res.allowed);
        assert_eq!(res.remaining, 4);
    }

    #[test]
    fn window_slides() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(2);
        assert!(limiter.check_at("k", &cfg, None, T0).allowed);
        assert!(limiter.check_at("k", &cfg, None, T0 + 30 * SEC).allowed);
        assert!(!limiter.check_at("k", &cfg, None, T0 + 59 * SEC).allowed);

        // first timestamp sits exactly on window_start: excluded
        let res = limiter.check_at("k", &cfg, None, T0 + 60 * SEC);
        assert!(res.allowed);
        assert_eq!(res.remaining, 0);
        assert_eq!(res.reset_at, T0 + 90 * SEC);

        let res = limiter.check_at("k", &cfg, None, T0 + 200 * SEC);
        assert!(res.allowed);
        assert_eq!(res.remaining, 1);
    }

    #[test]
    fn rejected_calls_do_not_consume() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(1);
        assert!(limiter.check_at("k", &cfg, None, T0).allowed);
        for i in 1..10 {
            assert!(!limiter.check_at("k", &cfg, None, T0 + i * SEC).allowed);
        }
        assert_eq!(limiter.store().get("k").unwrap().timestamps, vec![T0]);
    }

    #[test]
    fn tier_multiplies_quota() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(2).with_tiers(&[("enterprise", 2.5)]);

        let first = limiter.check_at("u", &cfg, Some("enterprise"), T0);
        assert_eq!(first.limit, 5);
        assert_eq!(first.remaining, 4);

        let unlisted = limiter.check_at("v", &cfg, Some("free"), T0);
        assert_eq!(unlisted.limit, 2);
        assert_eq!(unlisted.remaining, 1);
    }

    #[test]
    fn zero_limit_always_rejects_with_min_retry() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(0);
        let res = limiter.check_at("k", &cfg, None, T0);
        assert!(!res.allowed);
        assert_eq!(res.limit, 0);
        assert_eq!(res.remaining, 0);
        assert_eq!(res.reset_at, T0 + 60 * SEC);
        assert_eq!(res.retry_after, 60);

        let negative = RateLimitConfig::per_minute(3).with_tiers(&[("bad", -2.0)]);
        let res = limiter.check_at("k", &negative, Some("bad"), T0);
        assert!(!res.allowed);
        assert!(res.retry_after >= 1);
        assert!(limiter.store().get("k").is_none());
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = limiter();
        let cfg = RateLimitConfig::new(1, Duration::from_millis(500));
        assert!(limiter.check_at("k", &cfg, None, T0).allowed);

        let res = limiter.check_at("k", &cfg, None, T0 + 400);
        assert!(!res.allowed);
        assert_eq!(res.retry_after, 1);
    }

    #[test]
    fn retry_after_rounds_up() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(1);
        assert!(limiter.check_at("k", &cfg, None, T0).allowed);

        let res = limiter.check_at("k", &cfg, None, T0 + 10_500);
        assert_eq!(res.retry_after, 50);
    }

    #[test]
    fn request_path_sweeps_idle_identifiers() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryWindowStore::new()),
            Duration::from_secs(300),
        );
        let cfg = RateLimitConfig::per_minute(5);

        // first check sweeps (last sweep = 0), then records
        limiter.check_at("idle", &cfg, None, T0);
        assert_eq!(limiter.store().len(), 1);

        // inside the interval: no sweep, idle entry survives
        limiter.check_at("busy", &cfg, None, T0 + 120 * SEC);
        assert_eq!(limiter.store().len(), 2);

        // past the interval: idle entry is swept before busy records again
        limiter.check_at("busy", &cfg, None, T0 + 301 * SEC);
        assert!(limiter.store().get("idle").is_none());
        assert_eq!(limiter.store().len(), 1);
    }

    #[test]
    fn sweep_respects_longest_window() {
        let limiter = limiter();
        let hourly = RateLimitConfig::per_hour(5);
        let minutely = RateLimitConfig::per_minute(5);

        limiter.check_at("batch:user:a", &hourly, None, T0);
        // 10 minutes later a per-minute check triggers the sweep
        limiter.check_at("ai:user:a", &minutely, None, T0 + 600 * SEC);

        let entry = limiter.store().get("batch:user:a").unwrap();
        assert_eq!(entry.timestamps, vec![T0]);
    }

    #[test]
    fn non_finite_multiplier_rejects_without_overflow() {
        let limiter = limiter();
        let cfg = RateLimitConfig::per_minute(5);
        assert!(limiter.check_at("k", &cfg, None, T0).allowed);

        let broken = RateLimitConfig::per_minute(5).with_tiers(&[("bad", f64::NEG_INFINITY)]);
        let res = limiter.check_at("k", &broken, Some("bad"), T0 + 1);
        assert!(!res.allowed);
        assert_eq!(res.limit, 0);
        assert_eq!(res.remaining, 0);
        assert_eq!(res.retry_after, 60);

        let huge = RateLimitConfig::per_minute(5).with_tiers(&[("bad", -1e300)]);
        let res = limiter.check_at("k", &huge, Some("bad"), T0 + 2);
        assert!(!res.allowed);
        assert_eq!(res.remaining, 0);
    }

    #[test]
    fn sweep_now_drops_idle_entries_and_stamps_time() {
        let limiter = limiter().with_longest_window(Duration::from_secs(60));
        // T0 is long past, so this entry is idle against the wall clock
        limiter.store.record("idle", T0);
        assert_eq!(limiter.store().len(), 1);

        let removed = limiter.sweep_now();
        assert_eq!(removed, 1);
        assert!(limiter.store().is_empty());
        assert!(limiter.last_sweep_ms.load(Ordering::Relaxed) > T0);
    }

    #[test]
    fn result_serializes_camel_case() {
        let res = RateLimitResult {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_at: 60_000,
            retry_after: 55,
        };
        let json = serde_json::to_value(res).unwrap();
        assert_eq!(json["retryAfter"], 55);
        assert_eq!(json["resetAt"], 60_000);
        assert_eq!(res.reset_at_secs(), 60);
    }
}
