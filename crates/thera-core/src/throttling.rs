use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use tracing::debug;

use crate::provider_policy::DomainPolicy;

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Point-in-time view of one throttled domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainThrottleState {
    pub domain: String,
    pub min_interval: Duration,
    pub last_request_at: Option<Instant>,
}

struct DomainThrottle {
    min_interval: Duration,
    limiter: DirectRateLimiter,
    // FIFO-fair: same-domain callers are admitted in arrival order.
    turn: tokio::sync::Mutex<()>,
    last_request_at: Mutex<Option<Instant>>,
}

impl DomainThrottle {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            limiter: governor::RateLimiter::direct(quota_from_interval(min_interval)),
            turn: tokio::sync::Mutex::new(()),
            last_request_at: Mutex::new(None),
        }
    }

    async fn acquire(&self) -> Duration {
        let _turn = self.turn.lock().await;
        let started = Instant::now();
        self.limiter.until_ready().await;
        let released = Instant::now();
        *self
            .last_request_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(released);
        released.saturating_duration_since(started)
    }

    fn last_request_at(&self) -> Option<Instant> {
        *self
            .last_request_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-domain throttle enforcing a minimum interval between requests.
///
/// Domains without a policy pass immediately. Waiting on one domain never
/// blocks callers of another.
#[derive(Clone, Default)]
pub struct RateLimiter {
    domains: Arc<HashMap<String, Arc<DomainThrottle>>>,
}

impl RateLimiter {
    pub fn new(policies: impl IntoIterator<Item = DomainPolicy>) -> Self {
        let domains = policies
            .into_iter()
            .filter(|policy| !policy.min_interval.is_zero())
            .map(|policy| {
                (
                    policy.domain,
                    Arc::new(DomainThrottle::new(policy.min_interval)),
                )
            })
            .collect();
        Self {
            domains: Arc::new(domains),
        }
    }

    /// Limiter with the published limits of every supported upstream.
    pub fn with_default_policies() -> Self {
        Self::new(DomainPolicy::defaults())
    }

    /// Limiter that never waits.
    pub fn unthrottled() -> Self {
        Self::default()
    }

    /// Wait until a request to `domain` is allowed; returns the time spent waiting.
    pub async fn acquire(&self, domain: &str) -> Duration {
        let Some(throttle) = self.domains.get(&domain.to_ascii_lowercase()) else {
            return Duration::ZERO;
        };

        let waited = throttle.acquire().await;
        if !waited.is_zero() {
            debug!(domain, waited_ms = waited.as_millis() as u64, "rate limiter delayed request");
        }
        waited
    }

    pub fn snapshot(&self, domain: &str) -> Option<DomainThrottleState> {
        let domain = domain.to_ascii_lowercase();
        let throttle = self.domains.get(&domain)?;
        Some(DomainThrottleState {
            min_interval: throttle.min_interval,
            last_request_at: throttle.last_request_at(),
            domain,
        })
    }

    pub fn is_throttled(&self, domain: &str) -> bool {
        self.domains.contains_key(&domain.to_ascii_lowercase())
    }
}

fn quota_from_interval(min_interval: Duration) -> Quota {
    let period = min_interval.max(Duration::from_millis(1));
    // `period` is never zero, so `with_period` always yields a quota.
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tolerance for the limiter's monotonic clock differing from `Instant`.
    const SLACK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn unconfigured_domain_is_not_delayed() {
        let limiter = RateLimiter::new([DomainPolicy::new("a.test", Duration::from_secs(60))]);

        let started = Instant::now();
        for _ in 0..5 {
            assert_eq!(limiter.acquire("b.test").await, Duration::ZERO);
        }
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(limiter.snapshot("b.test").is_none());
    }

    #[tokio::test]
    async fn same_domain_requests_are_spaced_by_interval() {
        let interval = Duration::from_millis(50);
        let limiter = RateLimiter::new([DomainPolicy::new("a.test", interval)]);

        let started = Instant::now();
        for _ in 0..4 {
            limiter.acquire("a.test").await;
        }

        assert!(started.elapsed() + SLACK >= interval * 3);
    }

    #[tokio::test]
    async fn concurrent_callers_on_one_domain_are_serialized() {
        let interval = Duration::from_millis(40);
        let limiter = RateLimiter::new([DomainPolicy::new("a.test", interval)]);

        let started = Instant::now();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire("a.test").await })
            })
            .collect();
        for task in tasks {
            task.await.expect("task");
        }

        assert!(started.elapsed() + SLACK >= interval * 2);
    }

    #[tokio::test]
    async fn different_domains_do_not_block_each_other() {
        let limiter = RateLimiter::new([
            DomainPolicy::new("slow.test", Duration::from_millis(400)),
            DomainPolicy::new("fast.test", Duration::from_millis(10)),
        ]);

        limiter.acquire("slow.test").await;
        let slow = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire("slow.test").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        limiter.acquire("fast.test").await;
        assert!(started.elapsed() < Duration::from_millis(200));

        slow.await.expect("slow task");
    }

    #[tokio::test]
    async fn snapshot_records_last_release() {
        let limiter = RateLimiter::new([DomainPolicy::new("A.test", Duration::from_millis(10))]);
        assert_eq!(
            limiter.snapshot("a.test").expect("configured").last_request_at,
            None
        );

        limiter.acquire("a.test").await;

        let state = limiter.snapshot("a.test").expect("configured");
        assert_eq!(state.domain, "a.test");
        assert_eq!(state.min_interval, Duration::from_millis(10));
        assert!(state.last_request_at.is_some());
    }
}
