//! Endpoint validation.
//!
//! The pool only needs a probe primitive that answers "does this endpoint
//! relay traffic, and as which protocol?". The default implementation issues
//! a real HTTP request through the candidate against an IP-echo service.

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::proxy::Protocol;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::USER_AGENT;
use std::net::IpAddr;
use std::time::Duration;

/// Outcome of a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Protocol the endpoint answered as.
    pub protocol: Protocol,
    /// Egress IP observed through the endpoint.
    pub egress_ip: IpAddr,
}

/// Protocol probe primitive used by the validation workers.
#[async_trait]
pub trait Validate: Send + Sync {
    async fn probe(&self, endpoint: &str) -> Result<Verdict>;
}

/// Validates an endpoint by relaying an HTTP GET through it, trying each
/// SOCKS version in turn. The response body must be the egress IP.
pub struct HttpValidator {
    check_endpoints: Vec<String>,
    user_agents: Vec<String>,
    timeout: Duration,
}

impl HttpValidator {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            check_endpoints: config.check_endpoints.clone(),
            user_agents: config.user_agents.clone(),
            timeout: config.validation_timeout,
        }
    }

    fn pick_targets(&self) -> (String, String) {
        let mut rng = rand::rng();
        let check = self.check_endpoints[rng.random_range(0..self.check_endpoints.len())].clone();
        let agent = self.user_agents[rng.random_range(0..self.user_agents.len())].clone();
        (check, agent)
    }

    async fn probe_as(&self, endpoint: &str, protocol: Protocol) -> Result<IpAddr> {
        let scheme = protocol
            .scheme()
            .ok_or_else(|| Error::ValidationFailed("no scheme for unknown protocol".into()))?;
        let proxy = reqwest::Proxy::all(format!("{}://{}", scheme, endpoint))
            .map_err(|e| Error::ValidationFailed(e.to_string()))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::ValidationFailed(e.to_string()))?;

        let (check, agent) = self.pick_targets();
        let body = client
            .get(&check)
            .header(USER_AGENT, agent)
            .send()
            .await
            .map_err(|e| Error::ValidationFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::ValidationFailed(e.to_string()))?
            .text()
            .await
            .map_err(|e| Error::ValidationFailed(e.to_string()))?;

        body.trim()
            .parse::<IpAddr>()
            .map_err(|_| Error::ValidationFailed(format!("{} returned a non-IP body", check)))
    }
}

#[async_trait]
impl Validate for HttpValidator {
    async fn probe(&self, endpoint: &str) -> Result<Verdict> {
        let mut last = Error::ValidationFailed("no protocol answered".into());
        for protocol in [Protocol::Socks4, Protocol::Socks4a, Protocol::Socks5] {
            match self.probe_as(endpoint, protocol).await {
                Ok(egress_ip) => {
                    return Ok(Verdict {
                        protocol,
                        egress_ip,
                    })
                }
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}
