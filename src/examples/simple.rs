//! Simple example: load a proxy list, wait for validated proxies, and
//! tunnel a request through the rotating dialer.

use sockpool::{PoolConfig, ProxyPool};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = PoolConfig::builder()
        .max_workers(200)
        .validation_timeout(Duration::from_secs(5))
        .stale_after(Duration::from_secs(1800))
        .build();

    let pool = ProxyPool::new(config)?;
    pool.enable_debug();

    // One host:port per line, like the lists published by Free-Proxy.
    let count = pool.load_proxy_txt("socks.list")?;
    println!("loaded {} candidate endpoints", count);

    pool.start();

    println!("dialing through the first usable proxy...");
    let dialer = pool.dialer();
    let mut conn = dialer.dial("tcp", "example.com:80").await?;

    conn.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = String::new();
    conn.read_to_string(&mut response).await?;
    println!("{}", response.lines().next().unwrap_or_default());

    let snap = pool.stats();
    println!(
        "validated: {} socks4 / {} socks4a / {} socks5, dispensed {}, up {:?}",
        snap.valid4, snap.valid4a, snap.valid5, snap.dispensed, snap.uptime
    );

    pool.stop().await;
    Ok(())
}
