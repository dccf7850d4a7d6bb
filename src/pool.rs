//! Core proxy pool engine.
//!
//! Candidate endpoints flow from the registry into the pending queue, get
//! validated by the elastic worker pool, and land on protocol-segmented
//! dispatch streams that consumers drain. A recycling pass periodically
//! re-enqueues every known endpoint so health state converges. Every send
//! that could block is a `try_send`; excess is dropped, never queued
//! unboundedly.

use crate::config::PoolConfig;
use crate::dialer::MysteryDialer;
use crate::error::{Error, Result};
use crate::limiter::EndpointLimiter;
use crate::proxy::{Protocol, Proxy};
use crate::registry::Registry;
use crate::scaler::{Scale, ThroughputScaler, TickGate, SCALE_TICK};
use crate::stats::{Statistics, StatsSnapshot};
use crate::utils;
use crate::validator::{HttpValidator, Validate, Verdict};
use crate::worker::WorkerPool;

use futures::FutureExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time;

/// Dispatch streams are effectively unbounded so bursts of validated
/// endpoints never block a worker.
const DISPATCH_CAPACITY: usize = 1_000_000;

/// How long the job spawner sleeps on an empty pending queue before trying
/// a recycling pass.
const IDLE_PAUSE: Duration = Duration::from_millis(500);

/// Processing state of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Background loops are running.
    Running,
    /// Loops are stopped; registry and stream state are retained.
    Paused,
    /// Terminally stopped.
    Closed,
}

/// A protocol-segmented output stream of validated proxies.
struct DispatchStream {
    tx: mpsc::Sender<Arc<Proxy>>,
    rx: Mutex<mpsc::Receiver<Arc<Proxy>>>,
}

impl DispatchStream {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(DISPATCH_CAPACITY);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

/// A pool of SOCKS proxies under continuous revalidation.
pub struct ProxyPool {
    config: PoolConfig,
    registry: Registry,
    stats: Statistics,
    workers: WorkerPool,
    scaler: Box<dyn Scale>,
    tick: TickGate,
    use_limiter: EndpointLimiter,
    bad_limiter: EndpointLimiter,
    validator: Arc<dyn Validate>,
    pending_tx: mpsc::Sender<Arc<Proxy>>,
    pending_rx: tokio::sync::Mutex<mpsc::Receiver<Arc<Proxy>>>,
    socks4: DispatchStream,
    socks4a: DispatchStream,
    socks5: DispatchStream,
    status: Mutex<PoolStatus>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    debug: AtomicBool,
}

impl ProxyPool {
    /// Create a new pool with the default HTTP validation probe.
    pub fn new(config: PoolConfig) -> Result<Arc<Self>> {
        let validator = Arc::new(HttpValidator::new(&config));
        Self::with_validator(config, validator)
    }

    /// Create a new pool with a custom validation probe.
    pub fn with_validator(config: PoolConfig, validator: Arc<dyn Validate>) -> Result<Arc<Self>> {
        config.validate()?;
        let use_limiter = EndpointLimiter::new(&config.use_limiter)?;
        let bad_limiter = EndpointLimiter::new(&config.bad_limiter)?;
        let (pending_tx, pending_rx) = mpsc::channel(config.pending_capacity);
        let scaler = ThroughputScaler::new(config.max_workers, config.max_workers * 4);

        Ok(Arc::new(Self {
            workers: WorkerPool::new(config.max_workers),
            scaler: Box::new(scaler),
            tick: TickGate::new(SCALE_TICK),
            registry: Registry::new(),
            stats: Statistics::new(),
            use_limiter,
            bad_limiter,
            validator,
            pending_tx,
            pending_rx: tokio::sync::Mutex::new(pending_rx),
            socks4: DispatchStream::new(),
            socks4a: DispatchStream::new(),
            socks5: DispatchStream::new(),
            status: Mutex::new(PoolStatus::Paused),
            shutdown: Mutex::new(None),
            debug: AtomicBool::new(false),
            config,
        }))
    }

    // ---- lifecycle ----

    /// Begin the job spawner / recycling / scaler loops. A no-op while
    /// already running; refused once the pool has been stopped.
    pub fn start(self: &Arc<Self>) {
        {
            let mut status = self.status.lock();
            match *status {
                PoolStatus::Running => return,
                PoolStatus::Closed => {
                    warn!("cannot start a stopped pool");
                    return;
                }
                PoolStatus::Paused => *status = PoolStatus::Running,
            }
        }
        self.workers.reopen();
        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.job_spawner(rx).await;
        });
        info!("proxy pool started");
    }

    /// Stop processing without tearing down registry or stream state.
    pub async fn pause(&self) {
        self.halt(PoolStatus::Paused).await;
    }

    /// Resume a paused pool.
    pub fn resume(self: &Arc<Self>) {
        self.start();
    }

    /// Trigger cancellation and release the worker pool.
    pub async fn stop(&self) {
        self.halt(PoolStatus::Closed).await;
    }

    async fn halt(&self, to: PoolStatus) {
        {
            let mut status = self.status.lock();
            if *status == PoolStatus::Closed {
                return;
            }
            *status = to;
        }
        let sender = self.shutdown.lock().take();
        if let Some(tx) = sender {
            let _ = tx.send(true);
        }
        self.workers.close().await;
        info!("proxy pool {}", if to == PoolStatus::Closed { "stopped" } else { "paused" });
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.status() == PoolStatus::Running
    }

    // ---- ingestion ----

    /// Create-or-return the registry entry for `endpoint` and queue it for
    /// validation. Adding an endpoint that already exists never resets its
    /// live state.
    pub fn add(&self, endpoint: &str) -> Arc<Proxy> {
        let proxy = self.registry.add(endpoint);
        if let Err(TrySendError::Full(_)) = self.pending_tx.try_send(Arc::clone(&proxy)) {
            self.dbg(&format!(
                "pending queue full, {} will wait for recycling",
                endpoint
            ));
        }
        proxy
    }

    /// Remove an endpoint from the registry. Fails with `NotFound` if absent.
    pub fn remove(&self, endpoint: &str) -> Result<()> {
        self.registry.delete(endpoint)
    }

    /// Drop every known endpoint.
    pub fn clear(&self) {
        self.registry.clear();
    }

    /// Look up a known endpoint.
    pub fn get(&self, endpoint: &str) -> Option<Arc<Proxy>> {
        self.registry.get(endpoint)
    }

    /// Number of known endpoints.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Load candidate endpoints from a text file, one `host:port` per line.
    /// Returns how many were added.
    pub fn load_proxy_txt(&self, path: impl AsRef<Path>) -> io::Result<usize> {
        let endpoints = utils::load_proxy_txt(path)?;
        let count = endpoints.len();
        for endpoint in endpoints {
            self.add(&endpoint);
        }
        info!("loaded {} candidate endpoints", count);
        Ok(count)
    }

    // ---- consumption ----

    /// Draw a validated SOCKS4 proxy, if one is ready.
    pub fn draw_socks4(&self) -> Option<Arc<Proxy>> {
        self.draw_from(&self.socks4)
    }

    /// Draw a validated SOCKS4a proxy, if one is ready.
    pub fn draw_socks4a(&self) -> Option<Arc<Proxy>> {
        self.draw_from(&self.socks4a)
    }

    /// Draw a validated SOCKS5 proxy, if one is ready.
    pub fn draw_socks5(&self) -> Option<Arc<Proxy>> {
        self.draw_from(&self.socks5)
    }

    /// Draw a validated proxy of any protocol.
    pub fn draw_any(&self) -> Option<Arc<Proxy>> {
        self.draw_socks5()
            .or_else(|| self.draw_socks4a())
            .or_else(|| self.draw_socks4())
    }

    /// Pop entries until one passes the good/bad predicate and the use
    /// limiter. Rejected entries stay in the registry and come back through
    /// recycling.
    fn draw_from(&self, stream: &DispatchStream) -> Option<Arc<Proxy>> {
        let mut rx = stream.rx.lock();
        while let Ok(proxy) = rx.try_recv() {
            if !proxy.still_good(self.config.stale_after, self.config.bad_removal_threshold) {
                self.dbg(&format!("skipping {}, no longer good", proxy.endpoint()));
                continue;
            }
            if !self.use_limiter.allow(proxy.endpoint()) {
                self.dbg(&format!("skipping {}, use limited", proxy.endpoint()));
                continue;
            }
            self.stats.record_dispensed();
            return Some(proxy);
        }
        None
    }

    /// A connector that dials each request through a different proxy.
    pub fn dialer(self: &Arc<Self>) -> MysteryDialer {
        MysteryDialer::new(Arc::clone(self))
    }

    // ---- observability ----

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Emit diagnostic lines for this pool at debug level.
    pub fn enable_debug(&self) {
        self.debug.store(true, Ordering::Relaxed);
    }

    pub fn disable_debug(&self) {
        self.debug.store(false, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub(crate) fn dbg(&self, msg: &str) {
        if self.debug_enabled() {
            debug!("{}", msg);
        }
    }

    // ---- control loops ----

    /// Pull endpoints from the pending queue and hand them to the worker
    /// pool; on an idle queue, run a recycling pass. Observes shutdown at
    /// every iteration. The worker pool is drained by `halt`, which owns
    /// the cancellation signal.
    async fn job_spawner(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        self.dbg("job spawner started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let received = {
                let mut rx = self.pending_rx.lock().await;
                tokio::select! {
                    _ = shutdown.changed() => break,
                    received = time::timeout(IDLE_PAUSE, rx.recv()) => received,
                }
            };
            match received {
                Ok(Some(proxy)) => {
                    self.scale_tick();
                    if let Err(e) = self.submit_validation(proxy) {
                        self.dbg(&format!("submission rejected: {}", e));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    let count = self.recycle(&shutdown);
                    if count > 0 {
                        self.dbg(&format!("recycled {} proxies from the registry", count));
                    }
                }
            }
        }
        self.dbg("job spawner stopped");
    }

    /// Re-enqueue a snapshot of every known endpoint for revalidation.
    /// Never blocks: a full pending queue drops the rest of the pass.
    /// Returns how many were re-enqueued; aborts with 0 on shutdown.
    pub(crate) fn recycle(&self, shutdown: &watch::Receiver<bool>) -> usize {
        if !self.config.recycle || self.registry.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut logged_full = false;
        for proxy in self.registry.snapshot() {
            if *shutdown.borrow() {
                return 0;
            }
            match self.pending_tx.try_send(proxy) {
                Ok(()) => count += 1,
                Err(TrySendError::Full(_)) => {
                    if !logged_full {
                        self.dbg("pending queue is full, dropping recycle pass");
                        logged_full = true;
                    }
                }
                Err(TrySendError::Closed(_)) => return count,
            }
        }
        count
    }

    /// Apply one scaling decision, gated to the tick interval.
    fn scale_tick(&self) {
        if !self.tick.ready(Instant::now()) {
            return;
        }
        let dispensed = self.stats.snapshot().dispensed;
        let validated = self.stats.total_validated();
        if let Some(capacity) = self
            .scaler
            .decide(self.workers.capacity(), validated, dispensed)
        {
            self.workers.set_capacity(capacity);
            self.dbg(&format!("autoscaled workers to {}", capacity));
        }
    }

    // ---- validation ----

    fn submit_validation(self: &Arc<Self>, proxy: Arc<Proxy>) -> Result<()> {
        let pool = Arc::clone(self);
        self.workers.submit(async move {
            pool.run_validation(proxy).await;
        })
    }

    /// Validate one endpoint: probe under the configured timeout, then fold
    /// the outcome into proxy state, statistics, and the dispatch streams.
    /// The in-flight guard releases on every exit path, panics included.
    pub(crate) async fn run_validation(&self, proxy: Arc<Proxy>) {
        let Some(_guard) = proxy.begin_validation() else {
            self.dbg(&format!(
                "{} is already being validated, skipping",
                proxy.endpoint()
            ));
            return;
        };

        let probe = time::timeout(
            self.config.validation_timeout,
            self.validator.probe(proxy.endpoint()),
        );
        let outcome = match AssertUnwindSafe(probe).catch_unwind().await {
            Ok(Ok(Ok(verdict))) => Ok(verdict),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::ValidationFailed("probe timed out".into())),
            Err(_) => {
                warn!("validator panicked while probing {}", proxy.endpoint());
                Err(Error::ValidationFailed("validator panicked".into()))
            }
        };

        match outcome {
            Ok(verdict) => self.mark_good(&proxy, verdict),
            Err(e) => {
                self.dbg(&format!("{} failed validation: {}", proxy.endpoint(), e));
                self.mark_bad(&proxy);
            }
        }
    }

    /// Record a successful validation and push the proxy onto its protocol
    /// stream. The push never blocks; a full stream drops the reference.
    pub(crate) fn mark_good(&self, proxy: &Arc<Proxy>, verdict: Verdict) {
        proxy.record_success(verdict.protocol, verdict.egress_ip);
        self.stats.record_valid(verdict.protocol);

        let stream = match verdict.protocol {
            Protocol::Socks4 => &self.socks4,
            Protocol::Socks4a => &self.socks4a,
            Protocol::Socks5 => &self.socks5,
            Protocol::Unknown => return,
        };
        if stream.tx.try_send(Arc::clone(proxy)).is_err() {
            self.dbg(&format!(
                "{} stream full, dropping {}",
                verdict.protocol,
                proxy.endpoint()
            ));
        }
    }

    /// Count a failure against the endpoint, through the bad limiter so one
    /// transient blip cannot evict it, and evict at the threshold.
    fn mark_bad(&self, proxy: &Arc<Proxy>) {
        if !self.bad_limiter.allow(proxy.endpoint()) {
            self.dbg(&format!(
                "ignoring bad mark for {}, limiter engaged",
                proxy.endpoint()
            ));
            return;
        }
        let bad = proxy.record_failure();
        if bad >= self.config.bad_removal_threshold && self.registry.delete(proxy.endpoint()).is_ok() {
            self.dbg(&format!(
                "removed {} after {} failed validations",
                proxy.endpoint(),
                bad
            ));
        }
    }
}

#[cfg(test)]
impl ProxyPool {
    pub(crate) fn registry_for_tests(&self) -> &Registry {
        &self.registry
    }
}
