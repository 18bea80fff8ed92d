//! # Lifecycle Coordinator
//!
//! The long-lived server handle. It owns the cache, the dataset and the
//! current run (listener task + worker pool), and exposes the administrative
//! surface: `start`, `shutdown`, `is_running`, `state`, `name`.
//!
//! ## Shutdown Ordering
//!
//! ```text
//! 1. state := Stopped            acceptor guard fails
//! 2. stop signal + await acceptor listener dropped, no new work
//! 3. pool.shutdown()             queue closed
//!    └─ teardown task:
//!         await_termination(drain_timeout)   in-flight work finishes
//!         4. cache.shutdown()                sweeper stopped, entries cleared
//! ```
//!
//! Steps 3b and 4 run on a separate task: a `z` request executes on a pool
//! worker and must not wait for its own worker to drain.
//!
//! ## Runs
//!
//! Every `start` opens a new run with a fresh generation number. Connections
//! carry the generation of the run that accepted them, and a wire `z` only
//! stops that run; a `z` still queued in a drained pool cannot stop its
//! successor.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use isrv_common::{IsrvResult, ServerConfig};
use isrv_data::Dataset;
use isrv_engine::ResponseCache;

use crate::acceptor::{self, Acceptor};
use crate::metrics::Metrics;
use crate::pool::{PoolStats, WorkerPool};

/// Run state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

struct Running {
    generation: u64,
    stop: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
    pool: Arc<WorkerPool>,
}

struct Inner {
    config: ServerConfig,
    dataset: Arc<dyn Dataset>,
    cache: ResponseCache,
    metrics: Metrics,
    state: watch::Sender<LifecycleState>,
    /// Serializes `start` and `shutdown`.
    run: tokio::sync::Mutex<Option<Running>>,
    /// Pool of the current or most recent run, kept for status reporting.
    pool: Mutex<Option<Arc<WorkerPool>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    /// Completion flag of the most recent teardown.
    teardown: Mutex<Option<watch::Receiver<bool>>>,
    /// Generation of the current or most recent run; `0` before the first start.
    generation: AtomicU64,
}

/// Cheaply cloneable handle to the single server instance.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    /// Builds a stopped server. Nothing is bound until [`Server::start`].
    pub fn new(config: ServerConfig, dataset: Arc<dyn Dataset>) -> Self {
        let cache = ResponseCache::new(&config.cache);
        let (state, _) = watch::channel(LifecycleState::Stopped);
        Server {
            inner: Arc::new(Inner {
                config,
                dataset,
                cache,
                metrics: Metrics::new(),
                state,
                run: tokio::sync::Mutex::new(None),
                pool: Mutex::new(None),
                local_addr: Mutex::new(None),
                teardown: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Binds the listener and starts the acceptor, the pool and the sweeper.
    ///
    /// A no-op while already running. Fails only if the socket cannot be
    /// bound or the sweeper thread cannot be spawned.
    pub async fn start(&self) -> IsrvResult<()> {
        let mut run = loop {
            // A previous run may still be draining; let it clear the cache
            // first. The run lock is not held here because draining requests
            // may need it.
            self.await_teardown().await;
            let run = self.inner.run.lock().await;
            if run.is_some() {
                info!("server is already running");
                return Ok(());
            }
            if !self.teardown_pending() {
                break run;
            }
        };

        let listener = acceptor::bind(self.inner.config.listen_addr())?;
        let local_addr = listener.local_addr()?;
        self.inner.cache.start_sweeper()?;

        let pool = Arc::new(WorkerPool::new(self.inner.config.effective_pool_size()));
        let (stop, stop_rx) = watch::channel(false);
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;

        self.inner.state.send_replace(LifecycleState::Running);
        let acceptor = tokio::spawn(
            Acceptor::new(listener, Arc::clone(&pool), self.clone(), generation, stop_rx).run(),
        );

        *self.inner.pool.lock() = Some(Arc::clone(&pool));
        *self.inner.local_addr.lock() = Some(local_addr);
        *run = Some(Running {
            generation,
            stop,
            acceptor,
            pool: Arc::clone(&pool),
        });

        info!(
            addr = %local_addr,
            generation,
            pool_size = pool.size(),
            "server is running and accepts client requests"
        );
        Ok(())
    }

    /// Stops accepting connections and schedules the drain.
    ///
    /// Returns a confirmation message; a second call reports that the server
    /// is already closed. Use [`Server::wait_terminated`] to wait for the drain.
    pub async fn shutdown(&self) -> String {
        let mut run = self.inner.run.lock().await;
        match run.take() {
            Some(running) => self.stop_run(running).await,
            None => self.already_closed(),
        }
    }

    /// Like [`Server::shutdown`], but only if run `generation` is still the
    /// current one; otherwise the server is left alone.
    pub async fn shutdown_run(&self, generation: u64) -> String {
        let mut run = self.inner.run.lock().await;
        match run.take() {
            Some(running) if running.generation == generation => self.stop_run(running).await,
            other => {
                *run = other;
                debug!(generation, "shutdown request from a finished run ignored");
                self.already_closed()
            }
        }
    }

    fn already_closed(&self) -> String {
        format!("{} : Server already closed!", self.name())
    }

    /// Caller holds the run lock.
    async fn stop_run(&self, running: Running) -> String {
        self.inner.state.send_replace(LifecycleState::Stopped);

        let _ = running.stop.send(true);
        if let Err(err) = running.acceptor.await {
            warn!(error = %err, "acceptor task failed");
        }
        info!("server prepared for shutdown");

        let termination = running.pool.shutdown();
        let drain_timeout = self.inner.config.drain_timeout();
        let server = self.clone();
        let (finished, done) = watch::channel(false);
        *self.inner.teardown.lock() = Some(done);
        tokio::spawn(async move {
            if !termination.await_termination(drain_timeout).await {
                warn!(
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "worker pool did not drain in time, continuing teardown"
                );
            }

            let cache_owner = server.clone();
            let stopped =
                tokio::task::spawn_blocking(move || cache_owner.inner.cache.shutdown()).await;
            if let Err(err) = stopped {
                warn!(error = %err, "cache shutdown failed");
            }

            debug!(metrics = ?server.metrics().snapshot(), "final request metrics");
            info!("server shutdown completed");
            finished.send_replace(true);
        });

        format!("{} : Server socket closed!", self.name())
    }

    /// Resolves once the server is stopped (for example by a `z` request).
    pub async fn stopped(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s == LifecycleState::Stopped).await;
    }

    /// Resolves once the server is stopped and the drain has finished.
    pub async fn wait_terminated(&self) {
        self.stopped().await;
        // `shutdown` holds the run lock until the teardown flag is stored.
        drop(self.inner.run.lock().await);
        self.await_teardown().await;
    }

    async fn await_teardown(&self) {
        let pending = self.inner.teardown.lock().clone();
        if let Some(mut done) = pending {
            if done.wait_for(|finished| *finished).await.is_err() {
                warn!("teardown task ended before finishing");
            }
        }
    }

    fn teardown_pending(&self) -> bool {
        self.inner
            .teardown
            .lock()
            .as_ref()
            .is_some_and(|done| {
                let finished = *done.borrow();
                !finished && done.has_changed().is_ok()
            })
    }

    /// Generation of the current or most recent run.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        *self.inner.state.borrow() == LifecycleState::Running
    }

    pub fn lifecycle(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Human-readable pool and cache summary.
    pub fn state(&self) -> String {
        let pool = self.pool_stats();
        let cache = self.inner.cache.stats();
        format!(
            "{} --> Number of Threads in the ThreadPool: {};\
             Load of the ThreadPool: {} %;\
             Number of successfully executed tasks: {};\
             Number of all tasks: {};\
             Current size of queue: {};\
             Cache entries: {};\
             Cache hits: {};\
             Cache misses: {};",
            self.name(),
            pool.size,
            pool.load_percent(),
            pool.completed,
            pool.submitted,
            pool.queued,
            cache.entries,
            cache.hits,
            cache.misses,
        )
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner
            .pool
            .lock()
            .as_ref()
            .map(|pool| pool.stats())
            .unwrap_or_default()
    }

    /// Address the listener is (or was last) bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn dataset(&self) -> &dyn Dataset {
        self.inner.dataset.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Empty;

    impl Dataset for Empty {
        fn query(&self, _: &str, _: &str) -> String {
            String::new()
        }

        fn query_year(&self, _: &str, _: &str, _: u16) -> String {
            String::new()
        }

        fn report(&self, _: &str) -> String {
            String::new()
        }
    }

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.port = 0;
        config.pool_size = Some(2);
        config.drain_timeout_ms = 1_000;
        config
    }

    #[tokio::test]
    async fn start_and_shutdown_are_idempotent() {
        let server = Server::new(test_config(), Arc::new(Empty));
        assert!(!server.is_running());

        server.start().await.unwrap();
        server.start().await.unwrap();
        assert!(server.is_running());
        assert!(server.cache().is_sweeping());

        let first = server.shutdown().await;
        assert!(first.ends_with("Server socket closed!"), "{first}");
        assert!(!server.is_running());

        let second = server.shutdown().await;
        assert!(second.ends_with("Server already closed!"), "{second}");

        tokio::time::timeout(Duration::from_secs(5), server.wait_terminated())
            .await
            .unwrap();
        assert!(!server.cache().is_sweeping());
    }

    #[tokio::test]
    async fn state_reports_pool_size() {
        let server = Server::new(test_config(), Arc::new(Empty));
        server.start().await.unwrap();
        let state = server.state();
        assert!(state.starts_with("Multithreaded indicator server --> "), "{state}");
        assert!(state.contains("Number of Threads in the ThreadPool: 2;"), "{state}");
        assert!(state.contains("Current size of queue: 0;"), "{state}");
        server.shutdown().await;
        server.wait_terminated().await;
    }

    #[tokio::test]
    async fn can_restart_after_shutdown() {
        let server = Server::new(test_config(), Arc::new(Empty));
        server.start().await.unwrap();
        server.shutdown().await;
        server.start().await.unwrap();
        assert!(server.is_running());
        assert!(server.local_addr().is_some());
        server.shutdown().await;
        server.wait_terminated().await;
    }

    #[tokio::test]
    async fn bind_failure_aborts_start() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config();
        config.port = blocker.local_addr().unwrap().port();

        let server = Server::new(config, Arc::new(Empty));
        assert!(server.start().await.is_err());
        assert!(!server.is_running());
    }
}
