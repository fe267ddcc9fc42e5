//! Static quotas per endpoint class.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Quota for one endpoint class. Defined once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Max admissions per window at the base tier
    pub requests: u32,
    pub window: Duration,
    /// Tier name -> multiplier on `requests`. Missing tier means 1x.
    pub tier_multipliers: &'static [(&'static str, f64)],
}

impl RateLimitConfig {
    pub const fn new(requests: u32, window: Duration) -> Self {
        Self {
            requests,
            window,
            tier_multipliers: &[],
        }
    }

    pub const fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    pub const fn per_hour(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(3600))
    }

    pub const fn with_tiers(mut self, tier_multipliers: &'static [(&'static str, f64)]) -> Self {
        self.tier_multipliers = tier_multipliers;
        self
    }

    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    /// Multiplier for `tier`, 1.0 when the tier is absent or unlisted.
    pub fn multiplier(&self, tier: Option<&str>) -> f64 {
        tier.and_then(|tier| {
            self.tier_multipliers
                .iter()
                .find(|(name, _)| *name == tier)
                .map(|(_, multiplier)| *multiplier)
        })
        .unwrap_or(1.0)
    }

    /// `floor(requests * multiplier)`. Can be zero or negative on a bad multiplier.
    pub fn effective_limit(&self, tier: Option<&str>) -> i64 {
        (f64::from(self.requests) * self.multiplier(tier)).floor() as i64
    }
}

const AI: RateLimitConfig = RateLimitConfig::per_minute(10).with_tiers(&[
    ("navigator", 2.0),
    ("professional", 3.0),
    ("enterprise", 5.0),
]);

const STANDARD: RateLimitConfig = RateLimitConfig::per_minute(60).with_tiers(&[
    ("navigator", 1.5),
    ("professional", 2.0),
    ("enterprise", 3.0),
]);

const BATCH: RateLimitConfig =
    RateLimitConfig::per_hour(5).with_tiers(&[("professional", 2.0), ("enterprise", 4.0)]);

const PUBLIC: RateLimitConfig = RateLimitConfig::per_minute(20);

const WEBHOOK: RateLimitConfig = RateLimitConfig::per_minute(100);

/// Endpoint classes, keyed by a stable id used in routes and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// LLM-backed calls, the most expensive downstream
    Ai,
    Standard,
    Batch,
    /// Unauthenticated forms, always keyed by IP
    Public,
    Webhook,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 5] = [
        EndpointClass::Ai,
        EndpointClass::Standard,
        EndpointClass::Batch,
        EndpointClass::Public,
        EndpointClass::Webhook,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointClass::Ai => "ai",
            EndpointClass::Standard => "standard",
            EndpointClass::Batch => "batch",
            EndpointClass::Public => "public",
            EndpointClass::Webhook => "webhook",
        }
    }

    pub fn config(self) -> &'static RateLimitConfig {
        match self {
            EndpointClass::Ai => &AI,
            EndpointClass::Standard => &STANDARD,
            EndpointClass::Batch => &BATCH,
            EndpointClass::Public => &PUBLIC,
            EndpointClass::Webhook => &WEBHOOK,
        }
    }

    /// Public callers are anonymous, so they are bucketed by IP even when a
    /// user header is present.
    pub fn keys_by_user(self) -> bool {
        !matches!(self, EndpointClass::Public | EndpointClass::Webhook)
    }

    pub fn uses_tiers(self) -> bool {
        !self.config().tier_multipliers.is_empty()
    }

    /// Longest window across the table.
    pub fn longest_window() -> Duration {
        Self::ALL
            .iter()
            .map(|class| class.config().window)
            .max()
            .unwrap_or_default()
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown endpoint class: {0}")]
pub struct UnknownClass(pub String);

impl FromStr for EndpointClass {
    type Err = UnknownClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| UnknownClass(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_round_trip() {
        for class in EndpointClass::ALL {
            assert_eq!(class.as_str().parse::<EndpointClass>(), Ok(class));
        }
        assert_eq!(
            "graphql".parse::<EndpointClass>(),
            Err(UnknownClass("graphql".into()))
        );
    }

    #[test]
    fn tier_scaling_floors() {
        let ai = EndpointClass::Ai.config();
        assert_eq!(ai.effective_limit(None), 10);
        assert_eq!(ai.effective_limit(Some("enterprise")), 50);
        assert_eq!(ai.effective_limit(Some("free")), 10);

        // 60 * 1.5 = 90
        assert_eq!(
            EndpointClass::Standard.config().effective_limit(Some("navigator")),
            90
        );

        let odd = RateLimitConfig::per_minute(3).with_tiers(&[("half", 1.5)]);
        assert_eq!(odd.effective_limit(Some("half")), 4);
    }

    #[test]
    fn bad_multiplier_can_zero_the_limit() {
        let cfg = RateLimitConfig::per_minute(5).with_tiers(&[("banned", 0.0), ("weird", -1.0)]);
        assert_eq!(cfg.effective_limit(Some("banned")), 0);
        assert_eq!(cfg.effective_limit(Some("weird")), -5);
    }

    #[test]
    fn public_and_webhook_are_flat() {
        assert!(!EndpointClass::Public.uses_tiers());
        assert!(!EndpointClass::Webhook.uses_tiers());
        assert!(!EndpointClass::Public.keys_by_user());
        assert!(EndpointClass::Ai.uses_tiers());
        assert!(EndpointClass::Ai.keys_by_user());
    }

    #[test]
    fn longest_window_is_batch() {
        assert_eq!(EndpointClass::longest_window(), Duration::from_secs(3600));
    }
}
