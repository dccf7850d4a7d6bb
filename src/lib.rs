//! # sockpool
//!
//! A live, self-revalidating pool of SOCKS proxies.
//!
//! Candidate endpoints are continuously validated by relaying real HTTP
//! requests through them; verified proxies are served on protocol-segmented
//! streams (SOCKS4, SOCKS4a, SOCKS5) and through a rotating dialer that
//! picks a fresh proxy for every outbound connection. Validation capacity
//! autoscales from live throughput, endpoints that keep failing are evicted,
//! and everything already known is periodically recycled for revalidation.

pub mod config;
pub mod dialer;
pub mod error;
pub mod pool;
pub mod proxy;
pub mod scaler;
pub mod stats;
pub mod utils;
pub mod validator;
pub mod worker;

mod limiter;
mod registry;

pub use config::{PoolConfig, PoolConfigBuilder, RateLimitPolicy};
pub use dialer::{Connect, MysteryDialer, ProxyStream, SocksConnector};
pub use error::{Error, Result};
pub use pool::{PoolStatus, ProxyPool};
pub use proxy::{Protocol, Proxy};
pub use scaler::{Scale, ThroughputScaler};
pub use stats::StatsSnapshot;
pub use validator::{HttpValidator, Validate, Verdict};
pub use worker::{PoolState, WorkerPool};
