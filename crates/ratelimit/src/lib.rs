//! Sliding-window rate limiting with per-tenant suspension (C2, §4.2).
//!
//! A global window checked on every acquire, plus one window per tenant
//! created lazily. A tenant that exceeds its window is
//! suspended for a fixed duration rather than merely throttled, so a
//! caller can act on `retry_after_secs` to back off without retrying
//! immediately into exhaustion.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit exceeded for {scope}, retry after {retry_after_secs}s")]
    Exceeded { scope: String, retry_after_secs: u64 },

    #[error("tenant {tenant} suspended, retry after {retry_after_secs}s")]
    Suspended { tenant: String, retry_after_secs: u64 },
}

/// A fixed-size sliding window of request timestamps. `limit` requests are
/// allowed per `window`; timestamps older than `window` are pruned before
/// every check.
struct RateLimitWindow {
    requests: Vec<Instant>,
    limit: u32,
    window: Duration,
}

impl RateLimitWindow {
    fn new(limit: u32, window: Duration) -> Self {
        Self { requests: Vec::new(), limit, window }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.requests.retain(|t| now.duration_since(*t) < window);
    }

    fn is_allowed(&mut self, now: Instant) -> bool {
        self.prune(now);
        (self.requests.len() as u32) < self.limit
    }

    fn record(&mut self, now: Instant) {
        self.requests.push(now);
    }
}

struct RateLimiterState {
    global: RateLimitWindow,
    tenants: HashMap<String, RateLimitWindow>,
    suspended: HashMap<String, Instant>,
}

/// Global + per-tenant sliding-window limiter. Cloning is cheap: the
/// limiter is `Arc`-free by design, callers wrap it in `Arc` themselves
/// when sharing a single limiter instance across workers.
pub struct RateLimiter {
    global_rps: u32,
    tenant_rpm: u32,
    suspension: Duration,
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(global_rps: u32, tenant_rpm: u32, suspension_secs: u64) -> Self {
        Self {
            global_rps,
            tenant_rpm,
            suspension: Duration::from_secs(suspension_secs),
            state: Mutex::new(RateLimiterState {
                global: RateLimitWindow::new(global_rps, Duration::from_secs(1)),
                tenants: HashMap::new(),
                suspended: HashMap::new(),
            }),
        }
    }

    pub fn from_config(config: &kairos_core::config::RateLimitConfig) -> Self {
        Self::new(config.global_rps, config.tenant_rpm, config.suspension_secs)
    }

    pub fn is_tenant_suspended(&self, tenant: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.suspended.get(tenant).is_some_and(|until| Instant::now() < *until)
    }

    fn suspend_tenant(state: &mut RateLimiterState, tenant: &str, duration: Duration) {
        let until = Instant::now() + duration;
        state.suspended.insert(tenant.to_string(), until);
        tracing::warn!(tenant, suspend_secs = duration.as_secs(), "tenant suspended for rate limit violations");
    }

    /// Checks the global window first (applies even to `tenant = None`),
    /// then the tenant window if present. On a tenant violation the
    /// tenant is suspended for `suspension_secs` before the error is
    /// returned, so repeated immediate retries fail fast against the
    /// suspension check rather than re-evaluating the window.
    pub fn acquire(&self, tenant: Option<&str>) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        if !state.global.is_allowed(now) {
            return Err(RateLimitError::Exceeded { scope: "global".to_string(), retry_after_secs: 1 });
        }

        if let Some(tenant) = tenant {
            if let Some(until) = state.suspended.get(tenant) {
                if now < *until {
                    let remaining = (*until - now).as_secs().max(1);
                    return Err(RateLimitError::Suspended { tenant: tenant.to_string(), retry_after_secs: remaining });
                }
                state.suspended.remove(tenant);
            }

            let window = state
                .tenants
                .entry(tenant.to_string())
                .or_insert_with(|| RateLimitWindow::new(self.tenant_rpm, Duration::from_secs(60)));

            if !window.is_allowed(now) {
                let suspension = self.suspension;
                Self::suspend_tenant(&mut state, tenant, suspension);
                return Err(RateLimitError::Exceeded {
                    scope: tenant.to_string(),
                    retry_after_secs: suspension.as_secs(),
                });
            }
            window.record(now);
        }

        state.global.record(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_limit_blocks_excess_requests() {
        let limiter = RateLimiter::new(2, 60, 60);
        assert!(limiter.acquire(None).is_ok());
        assert!(limiter.acquire(None).is_ok());
        assert_eq!(
            limiter.acquire(None),
            Err(RateLimitError::Exceeded { scope: "global".to_string(), retry_after_secs: 1 })
        );
    }

    #[test]
    fn tenant_limit_suspends_after_exhaustion() {
        let limiter = RateLimiter::new(1000, 1, 30);
        assert!(limiter.acquire(Some("tenant-a")).is_ok());
        let err = limiter.acquire(Some("tenant-a")).unwrap_err();
        assert_eq!(err, RateLimitError::Exceeded { scope: "tenant-a".to_string(), retry_after_secs: 30 });
        assert!(limiter.is_tenant_suspended("tenant-a"));
    }

    #[test]
    fn suspended_tenant_rejected_even_with_window_capacity() {
        let limiter = RateLimiter::new(1000, 1, 30);
        limiter.acquire(Some("tenant-a")).unwrap();
        limiter.acquire(Some("tenant-a")).unwrap_err();
        let err = limiter.acquire(Some("tenant-a")).unwrap_err();
        assert!(matches!(err, RateLimitError::Suspended { .. }));
    }

    #[test]
    fn other_tenants_unaffected_by_one_tenants_suspension() {
        let limiter = RateLimiter::new(1000, 1, 30);
        limiter.acquire(Some("tenant-a")).unwrap();
        limiter.acquire(Some("tenant-a")).unwrap_err();
        assert!(limiter.acquire(Some("tenant-b")).is_ok());
    }

    #[test]
    fn no_tenant_only_applies_global_check() {
        let limiter = RateLimiter::new(5, 1, 30);
        for _ in 0..5 {
            assert!(limiter.acquire(None).is_ok());
        }
        assert!(limiter.acquire(None).is_err());
    }
}
