//! Proxy representation: protocol tag, health counters, and the per-endpoint
//! in-flight lock that prevents duplicate concurrent validation.

use parking_lot::RwLock;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// SOCKS protocol version of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Not yet determined.
    Unknown,
    /// SOCKS4.
    Socks4,
    /// SOCKS4a (hostname-capable SOCKS4).
    Socks4a,
    /// SOCKS5.
    Socks5,
}

impl Protocol {
    /// URI scheme for dialing through a proxy of this protocol.
    pub fn scheme(&self) -> Option<&'static str> {
        match self {
            Protocol::Unknown => None,
            Protocol::Socks4 => Some("socks4"),
            Protocol::Socks4a => Some("socks4a"),
            Protocol::Socks5 => Some("socks5"),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme().unwrap_or("unknown"))
    }
}

/// An individual proxy endpoint and its health state.
///
/// Owned by the registry and shared as `Arc<Proxy>`; workers hold a reference
/// only for the duration of one validation.
#[derive(Debug)]
pub struct Proxy {
    endpoint: String,
    protocol: RwLock<Protocol>,
    proxied_ip: RwLock<Option<IpAddr>>,
    last_verified: RwLock<Option<Instant>>,
    times_validated: AtomicU64,
    times_bad: AtomicU64,
    validating: AtomicBool,
}

impl Proxy {
    pub(crate) fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            protocol: RwLock::new(Protocol::Unknown),
            proxied_ip: RwLock::new(None),
            last_verified: RwLock::new(None),
            times_validated: AtomicU64::new(0),
            times_bad: AtomicU64::new(0),
            validating: AtomicBool::new(false),
        }
    }

    /// The `host:port` identity of this proxy.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Protocol determined by the last successful validation.
    pub fn protocol(&self) -> Protocol {
        *self.protocol.read()
    }

    /// Egress IP observed during the last successful validation. Diagnostic only.
    pub fn proxied_ip(&self) -> Option<IpAddr> {
        *self.proxied_ip.read()
    }

    /// When this proxy was last verified working, if ever.
    pub fn last_verified(&self) -> Option<Instant> {
        *self.last_verified.read()
    }

    /// Number of successful validations.
    pub fn times_validated(&self) -> u64 {
        self.times_validated.load(Ordering::Relaxed)
    }

    /// Number of times this proxy has been marked bad.
    pub fn times_bad(&self) -> u64 {
        self.times_bad.load(Ordering::Relaxed)
    }

    /// Protocol-qualified URI, e.g. `socks5://127.0.0.1:1080`.
    /// Unvalidated proxies have no scheme to qualify with.
    pub fn uri(&self) -> Option<String> {
        self.protocol()
            .scheme()
            .map(|scheme| format!("{}://{}", scheme, self.endpoint))
    }

    /// A proxy is stale when it has never been verified, or its last
    /// verification is older than `stale_after`.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        match *self.last_verified.read() {
            Some(at) => at.elapsed() > stale_after,
            None => true,
        }
    }

    /// The single good/bad predicate applied by every dispense path:
    /// non-stale and below the bad-removal threshold.
    pub(crate) fn still_good(&self, stale_after: Duration, bad_threshold: u64) -> bool {
        !self.is_stale(stale_after) && self.times_bad() < bad_threshold
    }

    /// Mark a validation as in flight. Returns `None` if one already is,
    /// in which case the caller must skip this proxy. The returned guard
    /// releases the lock on drop, on every exit path.
    pub(crate) fn begin_validation(&self) -> Option<ValidationGuard<'_>> {
        self.validating
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| ValidationGuard { proxy: self })
    }

    /// Whether a validation is currently in flight.
    pub(crate) fn is_validating(&self) -> bool {
        self.validating.load(Ordering::Acquire)
    }

    pub(crate) fn record_success(&self, protocol: Protocol, egress_ip: IpAddr) {
        *self.protocol.write() = protocol;
        *self.proxied_ip.write() = Some(egress_ip);
        *self.last_verified.write() = Some(Instant::now());
        self.times_validated.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the bad counter, returning the new count.
    pub(crate) fn record_failure(&self) -> u64 {
        self.times_bad.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Scoped release of a proxy's in-flight marker.
pub(crate) struct ValidationGuard<'a> {
    proxy: &'a Proxy,
}

impl Drop for ValidationGuard<'_> {
    fn drop(&mut self) {
        self.proxy.validating.store(false, Ordering::Release);
    }
}
