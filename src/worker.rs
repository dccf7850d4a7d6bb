//! Elastic bounded worker pool for validation jobs.
//!
//! Concurrency is bounded by a semaphore whose permit count tracks the
//! capacity field; the scaler resizes capacity without dropping in-flight
//! jobs. A panicking job is contained and logged, never taking down the
//! pool or its siblings.

use crate::error::{Error, Result};

use futures::FutureExt;
use log::warn;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// Lifecycle state of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting submissions.
    Open,
    /// No new submissions; outstanding jobs are finishing.
    Draining,
    /// Fully drained and closed.
    Closed,
}

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: AtomicUsize,
    configured: usize,
    state: Mutex<PoolState>,
    outstanding: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity: AtomicUsize::new(capacity),
            configured: capacity,
            state: Mutex::new(PoolState::Open),
            outstanding: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Number of jobs currently in flight.
    pub fn running(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Submit a job. Fails with `PoolSaturated` when every worker slot is
    /// busy or the pool is not open; callers treat this as transient and
    /// rely on recycling to resubmit.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // The state lock is held across the permit grab and the outstanding
        // increment so a concurrent close cannot miss this job.
        let state = self.state.lock();
        if *state != PoolState::Open {
            return Err(Error::PoolSaturated);
        }
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(Error::PoolSaturated),
        };
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        drop(state);
        let outstanding = Arc::clone(&self.outstanding);
        let drained = Arc::clone(&self.drained);
        tokio::spawn(async move {
            let _permit = permit;
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                warn!("validation worker panicked");
            }
            if outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                drained.notify_waiters();
            }
        });
        Ok(())
    }

    /// Resize the pool. Growing takes effect immediately; shrinking retires
    /// permits as running jobs hand them back, so in-flight work is never
    /// dropped.
    pub fn set_capacity(&self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1);
        let old = self.capacity.swap(new_capacity, Ordering::AcqRel);
        if new_capacity > old {
            self.permits.add_permits(new_capacity - old);
        } else if new_capacity < old {
            let permits = Arc::clone(&self.permits);
            let shed = (old - new_capacity) as u32;
            tokio::spawn(async move {
                if let Ok(retired) = permits.acquire_many(shed).await {
                    retired.forget();
                }
            });
        }
    }

    /// Stop accepting submissions and wait for outstanding jobs to finish.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == PoolState::Closed {
                return;
            }
            *state = PoolState::Draining;
        }
        loop {
            let notified = self.drained.notified();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }
        *self.state.lock() = PoolState::Closed;
    }

    /// Reopen a closed pool at its originally configured capacity.
    pub fn reopen(&self) {
        let mut state = self.state.lock();
        if *state == PoolState::Closed {
            *state = PoolState::Open;
            drop(state);
            self.set_capacity(self.configured);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_submit_runs_job() {
        let pool = WorkerPool::new(4);
        let hit = Arc::new(AtomicUsize::new(0));
        let hit2 = Arc::clone(&hit);
        pool.submit(async move {
            hit2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.close().await;
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saturation_is_transient() {
        let pool = WorkerPool::new(1);
        let gate = Arc::new(Notify::new());
        let gate2 = Arc::clone(&gate);
        pool.submit(async move {
            gate2.notified().await;
        })
        .unwrap();

        // The single slot is busy.
        assert!(matches!(pool.submit(async {}), Err(Error::PoolSaturated)));

        gate.notify_one();
        pool.close().await;
        assert_eq!(pool.running(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_and_reopen_restores() {
        let pool = WorkerPool::new(2);
        pool.set_capacity(7);
        pool.close().await;
        assert_eq!(pool.state(), PoolState::Closed);
        assert!(pool.submit(async {}).is_err());

        pool.reopen();
        assert_eq!(pool.state(), PoolState::Open);
        // Reopening restores the configured capacity, not the scaled one.
        assert_eq!(pool.capacity(), 2);
        assert!(pool.submit(async {}).is_ok());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_grow_unblocks_submissions() {
        let pool = WorkerPool::new(1);
        let gate = Arc::new(Notify::new());
        let gate2 = Arc::clone(&gate);
        pool.submit(async move {
            gate2.notified().await;
        })
        .unwrap();
        assert!(pool.submit(async {}).is_err());

        pool.set_capacity(2);
        assert!(pool.submit(async {}).is_ok());

        gate.notify_one();
        pool.close().await;
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let pool = WorkerPool::new(2);
        pool.submit(async {
            panic!("boom");
        })
        .unwrap();
        // Give the panicking task a moment to run.
        sleep(Duration::from_millis(20)).await;

        let hit = Arc::new(AtomicUsize::new(0));
        let hit2 = Arc::clone(&hit);
        pool.submit(async move {
            hit2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.close().await;
        assert_eq!(hit.load(Ordering::SeqCst), 1);
        assert_eq!(pool.running(), 0);
    }

    #[tokio::test]
    async fn test_close_waits_for_outstanding() {
        let pool = WorkerPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        let done2 = Arc::clone(&done);
        pool.submit(async move {
            sleep(Duration::from_millis(30)).await;
            done2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.close().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
