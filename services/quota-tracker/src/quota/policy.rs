use std::collections::HashMap;
use std::num::NonZeroU64;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::QuotaTrackerConfig;

use super::QuotaKind;

const fn non_zero(value: u64) -> NonZeroU64 {
    match NonZeroU64::new(value) {
        Some(value) => value,
        None => panic!("policy constants must be non-zero"),
    }
}

/// Limit applied to one quota kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitPolicy {
    limit: NonZeroU64,
    window_duration_ms: NonZeroU64,
}

pub const FAIR_USE_MESSAGES_POLICY: LimitPolicy = LimitPolicy {
    limit: non_zero(200),
    window_duration_ms: non_zero(3 * 60 * 60 * 1_000),
};

pub const DEFAULT_POLICY: LimitPolicy = LimitPolicy {
    limit: non_zero(100),
    window_duration_ms: non_zero(60 * 60 * 1_000),
};

impl LimitPolicy {
    /// `None` when either the limit or the window is zero.
    pub fn new(limit: u64, window: Duration) -> Option<Self> {
        let window_ms = u64::try_from(window.as_millis()).ok()?;
        Some(Self {
            limit: NonZeroU64::new(limit)?,
            window_duration_ms: NonZeroU64::new(window_ms)?,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit.get()
    }

    pub fn window_duration_ms(&self) -> u64 {
        self.window_duration_ms.get()
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_duration_ms.get())
    }
}

/// Maps a (principal, kind) pair to the limit that governs it.
///
/// Implementations must be pure: no I/O and no failure mode.
pub trait LimitPolicyResolver: Send + Sync {
    fn resolve(&self, principal_id: &str, quota_kind: &QuotaKind) -> LimitPolicy;
}

/// Policy table keyed by quota kind with a catch-all default.
#[derive(Debug, Clone)]
pub struct StaticPolicyResolver {
    policies: HashMap<QuotaKind, LimitPolicy>,
    default: LimitPolicy,
}

impl StaticPolicyResolver {
    pub fn new(default: LimitPolicy) -> Self {
        Self {
            policies: HashMap::new(),
            default,
        }
    }

    pub fn with_policy(mut self, quota_kind: QuotaKind, policy: LimitPolicy) -> Self {
        self.policies.insert(quota_kind, policy);
        self
    }

    pub fn from_config(config: &QuotaTrackerConfig) -> Self {
        let fair_use = LimitPolicy::new(
            config.fair_use_message_limit,
            Duration::from_secs(config.fair_use_window_secs),
        )
        .unwrap_or_else(|| {
            warn!("fair-use policy misconfigured, using built-in values");
            FAIR_USE_MESSAGES_POLICY
        });
        let default = LimitPolicy::new(
            config.default_limit,
            Duration::from_secs(config.default_window_secs),
        )
        .unwrap_or_else(|| {
            warn!("default policy misconfigured, using built-in values");
            DEFAULT_POLICY
        });

        Self::new(default).with_policy(QuotaKind::FairUseMessages, fair_use)
    }
}

impl Default for StaticPolicyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_POLICY).with_policy(QuotaKind::FairUseMessages, FAIR_USE_MESSAGES_POLICY)
    }
}

impl LimitPolicyResolver for StaticPolicyResolver {
    fn resolve(&self, _principal_id: &str, quota_kind: &QuotaKind) -> LimitPolicy {
        self.policies
            .get(quota_kind)
            .copied()
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_table_matches_documented_defaults() {
        let resolver = StaticPolicyResolver::default();

        let fair_use = resolver.resolve("user-1", &QuotaKind::FairUseMessages);
        assert_eq!(fair_use.limit(), 200);
        assert_eq!(fair_use.window(), Duration::from_secs(3 * 60 * 60));

        let other = resolver.resolve("user-1", &QuotaKind::from("unknown-kind"));
        assert_eq!(other.limit(), 100);
        assert_eq!(other.window(), Duration::from_secs(60 * 60));
    }

    #[test]
    fn unknown_kind_falls_back_to_positive_default() {
        let resolver = StaticPolicyResolver::new(DEFAULT_POLICY);
        let policy = resolver.resolve("user-1", &QuotaKind::from("unknown-kind"));
        assert!(policy.limit() > 0);
        assert!(policy.window_duration_ms() > 0);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(LimitPolicy::new(0, Duration::from_secs(60)).is_none());
        assert!(LimitPolicy::new(10, Duration::ZERO).is_none());
        assert!(LimitPolicy::new(10, Duration::from_micros(500)).is_none());
    }

    #[test]
    fn config_overrides_table() {
        let config = QuotaTrackerConfig {
            fair_use_message_limit: 5,
            fair_use_window_secs: 60,
            default_limit: 7,
            default_window_secs: 30,
            ..QuotaTrackerConfig::default()
        };
        let resolver = StaticPolicyResolver::from_config(&config);

        let fair_use = resolver.resolve("user-1", &QuotaKind::FairUseMessages);
        assert_eq!(fair_use.limit(), 5);
        assert_eq!(fair_use.window_duration_ms(), 60_000);

        let other = resolver.resolve("user-1", &QuotaKind::from("exports"));
        assert_eq!(other.limit(), 7);
        assert_eq!(other.window_duration_ms(), 30_000);
    }

    #[test]
    fn misconfigured_values_fall_back_to_built_ins() {
        let config = QuotaTrackerConfig {
            fair_use_message_limit: 0,
            default_window_secs: 0,
            ..QuotaTrackerConfig::default()
        };
        let resolver = StaticPolicyResolver::from_config(&config);
        assert_eq!(
            resolver.resolve("user-1", &QuotaKind::FairUseMessages),
            FAIR_USE_MESSAGES_POLICY
        );
        assert_eq!(
            resolver.resolve("user-1", &QuotaKind::from("exports")),
            DEFAULT_POLICY
        );
    }
}
