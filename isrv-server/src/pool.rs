//! # Worker Pool
//!
//! Fixed number of worker tasks draining one shared, unbounded job queue.
//!
//! ## Design Principles
//!
//! 1. **Bounded Concurrency**: At most `size` jobs run at once; extra work
//!    waits in the queue instead of being rejected.
//! 2. **Close, Then Drain**: `shutdown` closes the queue; workers finish every
//!    job already queued and then exit.
//! 3. **Contained Panics**: Each job runs in its own task so a panic is logged
//!    and the worker slot survives.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use isrv_common::{IsrvError, IsrvResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    active: AtomicUsize,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker slots.
    pub size: usize,
    /// Jobs currently executing.
    pub active: usize,
    /// Jobs finished (including ones that panicked).
    pub completed: u64,
    /// Jobs ever accepted by `submit`.
    pub submitted: u64,
    /// Jobs waiting for a free slot.
    pub queued: u64,
}

impl PoolStats {
    /// Share of busy slots in percent.
    pub fn load_percent(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        self.active * 100 / self.size
    }
}

pub struct WorkerPool {
    size: usize,
    queue: Mutex<Option<UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawns `size` workers on the current tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..size)
            .map(|id| tokio::spawn(worker(id, Arc::clone(&rx), Arc::clone(&counters))))
            .collect();

        WorkerPool {
            size,
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            counters,
        }
    }

    /// Queues a job for the next free worker.
    pub fn submit<F>(&self, job: F) -> IsrvResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let queue = self.queue.lock();
        let tx = queue.as_ref().ok_or(IsrvError::PoolClosed)?;
        // Count before sending so `queued` never underflows.
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if tx.send(Box::pin(job)).is_err() {
            self.counters.submitted.fetch_sub(1, Ordering::Relaxed);
            return Err(IsrvError::PoolClosed);
        }
        Ok(())
    }

    /// Stops accepting jobs; already queued jobs still run.
    ///
    /// The returned handle waits for the workers. Calling `shutdown` again
    /// yields a handle with nothing to wait for.
    pub fn shutdown(&self) -> Termination {
        self.queue.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        debug!(workers = workers.len(), "worker pool closed");
        Termination { workers }
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.lock().is_none()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> PoolStats {
        let submitted = self.counters.submitted.load(Ordering::Relaxed);
        let started = self.counters.started.load(Ordering::Relaxed);
        PoolStats {
            size: self.size,
            active: self.counters.active.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            submitted,
            queued: submitted.saturating_sub(started),
        }
    }
}

/// Handle returned by [`WorkerPool::shutdown`].
#[must_use = "dropping a Termination does not wait for the workers"]
pub struct Termination {
    workers: Vec<JoinHandle<()>>,
}

impl Termination {
    /// Waits until every worker has exited or `timeout` elapses.
    ///
    /// Returns `false` on timeout; unfinished workers keep running detached.
    pub async fn await_termination(self, timeout: Duration) -> bool {
        let workers = self.workers;
        let joined = tokio::time::timeout(timeout, async move {
            for worker in workers {
                if let Err(err) = worker.await {
                    warn!(error = %err, "worker task failed");
                }
            }
        })
        .await;
        joined.is_ok()
    }
}

async fn worker(id: usize, queue: Arc<tokio::sync::Mutex<UnboundedReceiver<Job>>>, counters: Arc<Counters>) {
    loop {
        let job = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        counters.started.fetch_add(1, Ordering::Relaxed);
        counters.active.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = tokio::spawn(job).await {
            warn!(worker = id, error = %err, "request task panicked");
        }
        counters.active.fetch_sub(1, Ordering::Relaxed);
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }
    debug!(worker = id, "worker exited");
}
