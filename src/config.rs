//! Configuration for the proxy pool.

use crate::error::{Error, Result};

use std::time::Duration;

/// Default web services that respond with just the WAN IP of the connection.
/// All https, so every validated proxy is known SSL-capable.
const DEFAULT_CHECK_ENDPOINTS: &[&str] = &[
    "https://wtfismyip.com/text",
    "https://myexternalip.com/raw",
    "https://ipinfo.io/ip",
    "https://api.ipify.org/",
    "https://icanhazip.com/",
    "https://ifconfig.me/ip",
    "https://www.trackip.net/ip",
    "https://checkip.amazonaws.com/",
];

/// Small list of user agents drawn from randomly during validation.
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.12; rv:60.0) Gecko/20100101 Firefox/60.0",
    "Mozilla/5.0 (Windows NT 6.2; WOW64; rv:34.0) Gecko/20100101 Firefox/34.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux i686; rv:44.0) Gecko/20100101 Firefox/44.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.9; rv:49.0) Gecko/20100101 Firefox/49.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux i686; rv:55.0) Gecko/20100101 Firefox/55.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:58.0) Gecko/20100101 Firefox/58.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:60.0) Gecko/20100101 Firefox/60.0",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:28.0) Gecko/20100101 Firefox/28.0",
];

/// Sliding-window rate limit policy: at most `burst` events per `window` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Window length in seconds.
    pub window: u64,
    /// Maximum events allowed within one window.
    pub burst: u32,
}

impl RateLimitPolicy {
    /// Create a new policy.
    pub fn new(window: u64, burst: u32) -> Self {
        Self { window, burst }
    }
}

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Baseline number of concurrent validation workers.
    pub max_workers: usize,
    /// Time since last successful validation after which a proxy is stale.
    pub stale_after: Duration,
    /// Timeout applied to each validation probe.
    pub validation_timeout: Duration,
    /// Whether known endpoints are periodically re-enqueued for revalidation.
    pub recycle: bool,
    /// Number of bad markings after which an endpoint is evicted.
    pub bad_removal_threshold: u64,
    /// How often an endpoint may be dispensed to consumers.
    pub use_limiter: RateLimitPolicy,
    /// How often an endpoint may be marked bad before further markings are ignored.
    pub bad_limiter: RateLimitPolicy,
    /// IP-echo URLs used by the HTTP validator.
    pub check_endpoints: Vec<String>,
    /// User agents drawn from randomly for validation requests.
    pub user_agents: Vec<String>,
    /// Capacity of the pending (to-be-validated) queue.
    pub pending_capacity: usize,
}

impl PoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Reject configurations that can never self-correct at runtime.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::InvalidConfig("max_workers must be at least 1".into()));
        }
        if self.stale_after.is_zero() {
            return Err(Error::InvalidConfig("stale_after must be non-zero".into()));
        }
        if self.validation_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "validation_timeout must be non-zero".into(),
            ));
        }
        if self.bad_removal_threshold == 0 {
            return Err(Error::InvalidConfig(
                "bad_removal_threshold must be at least 1".into(),
            ));
        }
        if self.check_endpoints.is_empty() {
            return Err(Error::InvalidConfig("no check endpoints configured".into()));
        }
        if self.user_agents.is_empty() {
            return Err(Error::InvalidConfig("no user agents configured".into()));
        }
        if self.pending_capacity == 0 {
            return Err(Error::InvalidConfig(
                "pending_capacity must be at least 1".into(),
            ));
        }
        for policy in [&self.use_limiter, &self.bad_limiter] {
            if policy.window == 0 || policy.burst == 0 {
                return Err(Error::InvalidConfig(
                    "rate limit window and burst must be non-zero".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for `PoolConfig`.
pub struct PoolConfigBuilder {
    max_workers: Option<usize>,
    stale_after: Option<Duration>,
    validation_timeout: Option<Duration>,
    recycle: Option<bool>,
    bad_removal_threshold: Option<u64>,
    use_limiter: Option<RateLimitPolicy>,
    bad_limiter: Option<RateLimitPolicy>,
    check_endpoints: Vec<String>,
    user_agents: Vec<String>,
    pending_capacity: Option<usize>,
}

impl PoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_workers: None,
            stale_after: None,
            validation_timeout: None,
            recycle: None,
            bad_removal_threshold: None,
            use_limiter: None,
            bad_limiter: None,
            check_endpoints: Vec::new(),
            user_agents: Vec::new(),
            pending_capacity: None,
        }
    }

    /// Set the baseline number of concurrent validation workers.
    pub fn max_workers(mut self, count: usize) -> Self {
        self.max_workers = Some(count);
        self
    }

    /// Set the time since last validation after which a proxy goes stale.
    pub fn stale_after(mut self, after: Duration) -> Self {
        self.stale_after = Some(after);
        self
    }

    /// Set the timeout for each validation probe.
    pub fn validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = Some(timeout);
        self
    }

    /// Enable or disable recycling of known endpoints.
    pub fn recycle(mut self, enabled: bool) -> Self {
        self.recycle = Some(enabled);
        self
    }

    /// Set the bad-marking count that triggers eviction.
    pub fn bad_removal_threshold(mut self, count: u64) -> Self {
        self.bad_removal_threshold = Some(count);
        self
    }

    /// Set the dispense rate limit policy.
    pub fn use_limiter(mut self, policy: RateLimitPolicy) -> Self {
        self.use_limiter = Some(policy);
        self
    }

    /// Set the bad-marking rate limit policy.
    pub fn bad_limiter(mut self, policy: RateLimitPolicy) -> Self {
        self.bad_limiter = Some(policy);
        self
    }

    /// Set the IP-echo URLs used for validation.
    pub fn check_endpoints(mut self, endpoints: Vec<impl Into<String>>) -> Self {
        self.check_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Set the user agents used for validation requests.
    pub fn user_agents(mut self, agents: Vec<impl Into<String>>) -> Self {
        self.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Set the capacity of the pending queue.
    pub fn pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = Some(capacity);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PoolConfig {
        PoolConfig {
            max_workers: self.max_workers.unwrap_or(100),
            stale_after: self.stale_after.unwrap_or(Duration::from_secs(3600)),
            validation_timeout: self.validation_timeout.unwrap_or(Duration::from_secs(5)),
            recycle: self.recycle.unwrap_or(true),
            bad_removal_threshold: self.bad_removal_threshold.unwrap_or(5),
            use_limiter: self.use_limiter.unwrap_or(RateLimitPolicy::new(60, 2)),
            bad_limiter: self.bad_limiter.unwrap_or(RateLimitPolicy::new(60, 3)),
            check_endpoints: if self.check_endpoints.is_empty() {
                DEFAULT_CHECK_ENDPOINTS.iter().map(|s| s.to_string()).collect()
            } else {
                self.check_endpoints
            },
            user_agents: if self.user_agents.is_empty() {
                DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
            } else {
                self.user_agents
            },
            pending_capacity: self.pending_capacity.unwrap_or(100_000),
        }
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::builder().build();
        assert_eq!(config.max_workers, 100);
        assert_eq!(config.stale_after, Duration::from_secs(3600));
        assert_eq!(config.validation_timeout, Duration::from_secs(5));
        assert!(config.recycle);
        assert_eq!(config.bad_removal_threshold, 5);
        assert_eq!(config.use_limiter, RateLimitPolicy::new(60, 2));
        assert_eq!(config.bad_limiter, RateLimitPolicy::new(60, 3));
        assert!(!config.check_endpoints.is_empty());
        assert!(!config.user_agents.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = PoolConfig::builder()
            .max_workers(10)
            .stale_after(Duration::from_secs(60))
            .validation_timeout(Duration::from_secs(2))
            .recycle(false)
            .bad_removal_threshold(3)
            .use_limiter(RateLimitPolicy::new(30, 5))
            .check_endpoints(vec!["https://example.com/ip"])
            .pending_capacity(16)
            .build();

        assert_eq!(config.max_workers, 10);
        assert_eq!(config.stale_after, Duration::from_secs(60));
        assert!(!config.recycle);
        assert_eq!(config.bad_removal_threshold, 3);
        assert_eq!(config.use_limiter.burst, 5);
        assert_eq!(config.check_endpoints, vec!["https://example.com/ip"]);
        assert_eq!(config.pending_capacity, 16);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PoolConfig::builder().build();
        config.max_workers = 0;
        assert!(config.validate().is_err());

        let mut config = PoolConfig::builder().build();
        config.use_limiter = RateLimitPolicy::new(0, 2);
        assert!(config.validate().is_err());

        let mut config = PoolConfig::builder().build();
        config.bad_limiter = RateLimitPolicy::new(60, 0);
        assert!(config.validate().is_err());

        let mut config = PoolConfig::builder().build();
        config.check_endpoints.clear();
        assert!(config.validate().is_err());
    }
}
