//! Per-tenant admission control over fixed minute/hour/day windows.
//!
//! Ceilings come from each tenant's configuration; a request is admitted only
//! when every configured window still has capacity, and the whole
//! check-and-increment runs under one lock so concurrent requests for the
//! same tenant can never over-admit through a read-then-write race.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::tenant_config::RateLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    /// Narrowest first: a denial reports the smallest window that triggered
    /// it, which also carries the most accurate retry hint.
    pub const ORDERED: [WindowKind; 3] = [Self::Minute, Self::Hour, Self::Day];
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allow { remaining: u32 },
    Deny { window: WindowKind, retry_after_secs: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BucketKey {
    tenant: String,
    window: WindowKind,
    bucket: i64,
}

/// In-process counters, one bucket per (tenant, window, epoch slot).
/// A multi-node deployment would back this with a shared store; the
/// admission semantics here are the contract such a store must keep.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<BucketKey, u32>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, tenant: &str, limits: &RateLimits, now: DateTime<Utc>) -> RateDecision {
        let epoch = now.timestamp();
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut remaining = u32::MAX;
        for window in WindowKind::ORDERED {
            let Some(ceiling) = limits.ceiling(window) else { continue };
            let key = bucket_key(tenant, window, epoch);
            let used = buckets.get(&key).copied().unwrap_or(0);

            if used >= ceiling {
                let boundary = (epoch / window.seconds() + 1) * window.seconds();
                return RateDecision::Deny {
                    window,
                    retry_after_secs: (boundary - epoch).max(1),
                };
            }
            remaining = remaining.min(ceiling - used - 1);
        }

        // Every configured window has capacity; count the admission in all
        // of them before releasing the lock.
        for window in WindowKind::ORDERED {
            if limits.ceiling(window).is_some() {
                *buckets.entry(bucket_key(tenant, window, epoch)).or_insert(0) += 1;
            }
        }

        let remaining = if remaining == u32::MAX { 0 } else { remaining };
        RateDecision::Allow { remaining }
    }

    /// Drop buckets whose window has passed. Called opportunistically; the
    /// limiter stays correct without it, it just holds dead entries.
    pub fn prune(&self, now: DateTime<Utc>) {
        let epoch = now.timestamp();
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buckets.retain(|key, _| key.bucket == epoch / key.window.seconds());
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().expect("lock").len()
    }
}

fn bucket_key(tenant: &str, window: WindowKind, epoch: i64) -> BucketKey {
    BucketKey { tenant: tenant.to_string(), window, bucket: epoch / window.seconds() }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::tenant_config::RateLimits;

    use super::{RateDecision, RateLimiter, WindowKind};

    fn limits(per_minute: u32, per_hour: u32, per_day: u32) -> RateLimits {
        RateLimits { per_minute, per_hour, per_day }
    }

    #[test]
    fn admits_exactly_the_ceiling_and_no_more() {
        let limiter = RateLimiter::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 10).unwrap();
        let limits = limits(2, 0, 0);

        assert!(matches!(limiter.check("demo", &limits, now), RateDecision::Allow { .. }));
        assert!(matches!(limiter.check("demo", &limits, now), RateDecision::Allow { .. }));

        match limiter.check("demo", &limits, now) {
            RateDecision::Deny { window, retry_after_secs } => {
                assert_eq!(window, WindowKind::Minute);
                assert!(retry_after_secs > 0, "retry hint must be positive");
                assert_eq!(retry_after_secs, 50, "seconds to the minute boundary");
            }
            other => panic!("third request should be denied, got {other:?}"),
        }
    }

    #[test]
    fn denial_names_the_narrowest_exceeded_window() {
        let limiter = RateLimiter::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let limits = limits(1, 1, 0);

        assert!(matches!(limiter.check("demo", &limits, now), RateDecision::Allow { .. }));
        match limiter.check("demo", &limits, now) {
            RateDecision::Deny { window, .. } => assert_eq!(window, WindowKind::Minute),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn hour_ceiling_survives_minute_rollover() {
        let limiter = RateLimiter::new();
        let limits = limits(0, 2, 0);
        let first_minute = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let next_minute = Utc.with_ymd_and_hms(2026, 8, 30, 12, 1, 0).unwrap();

        assert!(matches!(limiter.check("demo", &limits, first_minute), RateDecision::Allow { .. }));
        assert!(matches!(limiter.check("demo", &limits, first_minute), RateDecision::Allow { .. }));
        match limiter.check("demo", &limits, next_minute) {
            RateDecision::Deny { window, retry_after_secs } => {
                assert_eq!(window, WindowKind::Hour);
                assert_eq!(retry_after_secs, 59 * 60);
            }
            other => panic!("expected hour denial, got {other:?}"),
        }
    }

    #[test]
    fn tenants_do_not_share_buckets() {
        let limiter = RateLimiter::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let limits = limits(1, 0, 0);

        assert!(matches!(limiter.check("a", &limits, now), RateDecision::Allow { .. }));
        assert!(matches!(limiter.check("b", &limits, now), RateDecision::Allow { .. }));
        assert!(matches!(limiter.check("a", &limits, now), RateDecision::Deny { .. }));
    }

    #[test]
    fn unconfigured_limits_always_admit() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        for _ in 0..100 {
            assert!(matches!(
                limiter.check("demo", &limits(0, 0, 0), now),
                RateDecision::Allow { remaining: 0 }
            ));
        }
    }

    #[test]
    fn concurrent_checks_admit_exactly_the_ceiling() {
        let limiter = Arc::new(RateLimiter::new());
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let ceiling = 8u32;
        let limits = Arc::new(limits(ceiling, 0, 0));

        let handles: Vec<_> = (0..ceiling + 4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let limits = Arc::clone(&limits);
                std::thread::spawn(move || {
                    matches!(limiter.check("demo", &limits, now), RateDecision::Allow { .. })
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|handle| handle.join().expect("admission thread"))
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(allowed, ceiling as usize);
    }

    #[test]
    fn prune_drops_expired_buckets() {
        let limiter = RateLimiter::new();
        let limits = limits(5, 0, 0);
        let earlier = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 8, 30, 12, 5, 0).unwrap();

        limiter.check("demo", &limits, earlier);
        assert_eq!(limiter.bucket_count(), 1);
        limiter.prune(later);
        assert_eq!(limiter.bucket_count(), 0);
    }
}
