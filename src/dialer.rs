//! The mystery dialer: a drop-in connector that dials every request through
//! a different validated proxy drawn from the pool.

use crate::error::{Error, Result};
use crate::pool::ProxyPool;
use crate::proxy::{Protocol, Proxy};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tokio_socks::tcp::socks4::Socks4Stream;
use tokio_socks::tcp::Socks5Stream;

/// Fixed timeout for the SOCKS-level connect.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// How long to wait before re-drawing when no usable proxy is ready.
const RETRY_PAUSE: Duration = Duration::from_millis(10);

/// A proxied connection.
pub trait ProxyConnection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProxyConnection for T {}

/// Boxed proxied connection handed to dialer callers.
pub type ProxyStream = Box<dyn ProxyConnection>;

/// SOCKS-level connect primitive used by the dialer.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, proxy: &Proxy, network: &str, target: &str) -> Result<ProxyStream>;
}

/// Default connect primitive speaking SOCKS4/4a/5 over TCP.
pub struct SocksConnector;

#[async_trait]
impl Connect for SocksConnector {
    async fn connect(&self, proxy: &Proxy, network: &str, target: &str) -> Result<ProxyStream> {
        if network != "tcp" {
            return Err(Error::Dial(format!("unsupported network: {}", network)));
        }
        match proxy.protocol() {
            Protocol::Socks5 => {
                let stream = Socks5Stream::connect(proxy.endpoint(), target)
                    .await
                    .map_err(|e| Error::Dial(e.to_string()))?;
                Ok(Box::new(stream) as ProxyStream)
            }
            Protocol::Socks4 | Protocol::Socks4a => {
                let stream = Socks4Stream::connect(proxy.endpoint(), target)
                    .await
                    .map_err(|e| Error::Dial(e.to_string()))?;
                Ok(Box::new(stream) as ProxyStream)
            }
            Protocol::Unknown => Err(Error::Dial(format!(
                "{} has no validated protocol",
                proxy.endpoint()
            ))),
        }
    }
}

/// Connector that selects a currently-good validated endpoint per request.
pub struct MysteryDialer {
    pool: Arc<ProxyPool>,
    connector: Arc<dyn Connect>,
}

impl MysteryDialer {
    pub fn new(pool: Arc<ProxyPool>) -> Self {
        Self::with_connector(pool, Arc::new(SocksConnector))
    }

    pub fn with_connector(pool: Arc<ProxyPool>, connector: Arc<dyn Connect>) -> Self {
        Self { pool, connector }
    }

    /// Dial `target` (`host:port`) through a freshly drawn proxy. Retries
    /// endpoint selection until a usable one appears; fails fast with
    /// `Cancelled` once the pool stops running. Errors from the underlying
    /// connect surface unchanged.
    pub async fn dial(&self, network: &str, target: &str) -> Result<ProxyStream> {
        let candidate = loop {
            if !self.pool.is_running() {
                return Err(Error::Cancelled);
            }
            // Draws are already filtered for staleness, badness, and use limits.
            match self.pool.draw_any() {
                Some(proxy) => break proxy,
                None => time::sleep(RETRY_PAUSE).await,
            }
        };

        let uri = candidate
            .uri()
            .unwrap_or_else(|| candidate.endpoint().to_string());
        self.pool.dbg(&format!("mystery dialer using {}", uri));

        match time::timeout(DIAL_TIMEOUT, self.connector.connect(&candidate, network, target)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Dial(format!("dial to {} timed out", target))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::validator::{Validate, Verdict};
    use parking_lot::Mutex;

    struct FailValidator;

    #[async_trait]
    impl Validate for FailValidator {
        async fn probe(&self, _endpoint: &str) -> Result<Verdict> {
            Err(Error::ValidationFailed("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Connect for RecordingConnector {
        async fn connect(&self, proxy: &Proxy, _network: &str, _target: &str) -> Result<ProxyStream> {
            self.calls.lock().push(proxy.endpoint().to_string());
            let (near, far) = tokio::io::duplex(64);
            // Keep the far end alive so reads do not immediately EOF.
            tokio::spawn(async move {
                let _far = far;
                time::sleep(Duration::from_millis(50)).await;
            });
            Ok(Box::new(near) as ProxyStream)
        }
    }

    fn test_pool(mutate: impl FnOnce(crate::config::PoolConfigBuilder) -> crate::config::PoolConfigBuilder) -> Arc<ProxyPool> {
        let config = mutate(PoolConfig::builder().recycle(false)).build();
        ProxyPool::with_validator(config, Arc::new(FailValidator)).unwrap()
    }

    fn socks5_verdict() -> Verdict {
        Verdict {
            protocol: Protocol::Socks5,
            egress_ip: "1.2.3.4".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_dials_through_good_candidate() {
        let pool = test_pool(|b| b);
        pool.start();
        let proxy = pool.registry_for_tests().add("10.0.0.1:1080");
        pool.mark_good(&proxy, socks5_verdict());

        let connector = Arc::new(RecordingConnector::default());
        let dialer = MysteryDialer::with_connector(Arc::clone(&pool), Arc::clone(&connector) as Arc<dyn Connect>);
        let _stream = dialer.dial("tcp", "example.com:80").await.unwrap();

        assert_eq!(*connector.calls.lock(), vec!["10.0.0.1:1080".to_string()]);
        assert_eq!(pool.stats().dispensed, 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_never_dials_stale_candidate() {
        let pool = test_pool(|b| b.stale_after(Duration::from_millis(1)));
        pool.start();
        let proxy = pool.registry_for_tests().add("10.0.0.1:1080");
        pool.mark_good(&proxy, socks5_verdict());
        time::sleep(Duration::from_millis(5)).await;

        let connector = Arc::new(RecordingConnector::default());
        let dialer = MysteryDialer::with_connector(Arc::clone(&pool), Arc::clone(&connector) as Arc<dyn Connect>);
        let call = tokio::spawn(async move { dialer.dial("tcp", "example.com:80").await });

        time::sleep(Duration::from_millis(50)).await;
        pool.stop().await;

        let result = call.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(connector.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_when_pool_not_running() {
        let pool = test_pool(|b| b);
        let dialer = MysteryDialer::new(Arc::clone(&pool));
        assert!(matches!(
            dialer.dial("tcp", "example.com:80").await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_socks_connector_rejects_bad_input() {
        let proxy = Proxy::new("10.0.0.1:1080".to_string());
        let connector = SocksConnector;

        let err = connector
            .connect(&proxy, "udp", "example.com:80")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Dial(_)));

        // Unvalidated proxies have no protocol to dial with.
        let err = connector
            .connect(&proxy, "tcp", "example.com:80")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Dial(_)));
    }
}
