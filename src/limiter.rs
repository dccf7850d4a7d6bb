//! Per-endpoint sliding-window rate limiting.

use crate::config::RateLimitPolicy;
use crate::error::{Error, Result};

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Sliding-window limiter keyed by endpoint identity. At most `burst` events
/// per endpoint per `window` seconds; excess events are rejected until the
/// window rolls over.
pub(crate) struct EndpointLimiter {
    inner: KeyedLimiter,
}

impl EndpointLimiter {
    pub(crate) fn new(policy: &RateLimitPolicy) -> Result<Self> {
        let burst = NonZeroU32::new(policy.burst)
            .ok_or_else(|| Error::InvalidConfig("rate limit burst must be non-zero".into()))?;
        if policy.window == 0 {
            return Err(Error::InvalidConfig(
                "rate limit window must be non-zero".into(),
            ));
        }
        // Replenish one slot per window/burst, so a full burst fits in one window.
        let period = Duration::from_secs(policy.window) / policy.burst;
        let quota = Quota::with_period(period)
            .ok_or_else(|| Error::InvalidConfig("rate limit window too short".into()))?
            .allow_burst(burst);
        Ok(Self {
            inner: RateLimiter::keyed(quota),
        })
    }

    /// Whether the event is allowed for this endpoint right now.
    /// An allowed event counts against the endpoint's window.
    pub(crate) fn allow(&self, endpoint: &str) -> bool {
        self.inner.check_key(&endpoint.to_string()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_denied() {
        let limiter = EndpointLimiter::new(&RateLimitPolicy::new(60, 2)).unwrap();
        assert!(limiter.allow("10.0.0.1:1080"));
        assert!(limiter.allow("10.0.0.1:1080"));
        assert!(!limiter.allow("10.0.0.1:1080"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = EndpointLimiter::new(&RateLimitPolicy::new(60, 1)).unwrap();
        assert!(limiter.allow("10.0.0.1:1080"));
        assert!(!limiter.allow("10.0.0.1:1080"));
        // A different endpoint has its own window.
        assert!(limiter.allow("10.0.0.2:1080"));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(EndpointLimiter::new(&RateLimitPolicy::new(60, 0)).is_err());
        assert!(EndpointLimiter::new(&RateLimitPolicy::new(0, 2)).is_err());
    }
}
