//! # Connection Acceptor
//!
//! Owns the listening socket and feeds accepted connections to the worker pool.
//!
//! The loop ends only when the lifecycle flips the stop signal; the listener
//! is dropped on the way out, which closes the socket exactly once. Any other
//! accept failure is logged and the loop keeps going.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use isrv_common::{IsrvError, IsrvResult};

use crate::connection;
use crate::pool::WorkerPool;
use crate::server::Server;

/// Pending-connection backlog for the listening socket.
const LISTEN_BACKLOG: i32 = 50;

/// Pause after a failed `accept` so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Binds a non-blocking listener with `SO_REUSEADDR` and hands it to tokio.
pub(crate) fn bind(addr: SocketAddr) -> IsrvResult<TcpListener> {
    let wrap = |source: io::Error| IsrvError::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(wrap)?;
    socket.set_reuse_address(true).map_err(wrap)?;
    socket.set_nonblocking(true).map_err(wrap)?;
    socket.bind(&addr.into()).map_err(wrap)?;
    socket.listen(LISTEN_BACKLOG).map_err(wrap)?;

    TcpListener::from_std(socket.into()).map_err(wrap)
}

/// Source of accepted connections.
pub(crate) trait Listener: Send + 'static {
    fn poll_accept(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>>;
}

impl Listener for TcpListener {
    fn poll_accept(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        TcpListener::poll_accept(self, cx)
    }
}

pub(crate) struct Acceptor<L> {
    listener: L,
    pool: Arc<WorkerPool>,
    server: Server,
    generation: u64,
    stop: watch::Receiver<bool>,
}

impl<L: Listener> Acceptor<L> {
    pub(crate) fn new(
        listener: L,
        pool: Arc<WorkerPool>,
        server: Server,
        generation: u64,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Acceptor {
            listener,
            pool,
            server,
            generation,
            stop,
        }
    }

    pub(crate) async fn run(self) {
        let Acceptor {
            mut listener,
            pool,
            server,
            generation,
            mut stop,
        } = self;
        info!(generation, "server-service for handling client requests started");

        while server.is_running() && !*stop.borrow() {
            tokio::select! {
                biased;
                // Also fires if the lifecycle dropped the sender.
                _ = stop.changed() => break,
                accepted = poll_fn(|cx| listener.poll_accept(cx)) => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let task_server = server.clone();
                        let submitted = pool.submit(async move {
                            connection::handle_connection(stream, peer, task_server, generation).await;
                        });
                        if let Err(err) = submitted {
                            warn!(%peer, error = %err, "dropping connection, pool is closed");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "error while accepting a client connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        info!("listening socket closed, acceptor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use isrv_common::ServerConfig;
    use isrv_data::Dataset;

    struct Silent;

    impl Dataset for Silent {
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

    /// Fails the first `failures` accepts, then behaves like the inner listener.
    struct Flaky {
        inner: TcpListener,
        failures: Arc<AtomicUsize>,
    }

    impl Listener for Flaky {
        fn poll_accept(
            &mut self,
            cx: &mut Context<'_>,
        ) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "connection aborted before accept",
                )));
            }
            self.inner.poll_accept(cx)
        }
    }

    #[tokio::test]
    async fn bind_reports_address_in_use() {
        let first = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();

        // SO_REUSEADDR does not allow two live listeners on one port.
        let err = bind(addr).unwrap_err();
        assert!(matches!(err, IsrvError::Bind { addr: a, .. } if a == addr), "{err}");
    }

    #[tokio::test]
    async fn accept_errors_do_not_stop_the_loop() {
        let mut config = ServerConfig::default();
        config.port = 0;
        config.pool_size = Some(1);
        let server = Server::new(config, Arc::new(Silent));
        server.start().await.unwrap();

        let inner = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = inner.local_addr().unwrap();
        let failures = Arc::new(AtomicUsize::new(2));
        let pool = Arc::new(WorkerPool::new(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let listener = Flaky {
            inner,
            failures: Arc::clone(&failures),
        };
        let acceptor = tokio::spawn(
            Acceptor::new(listener, Arc::clone(&pool), server.clone(), server.generation(), stop_rx)
                .run(),
        );

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"zz\n").await.unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, "Error\n");
        assert_eq!(failures.load(Ordering::SeqCst), 0);

        stop_tx.send(true).unwrap();
        acceptor.await.unwrap();
        assert!(pool.shutdown().await_termination(Duration::from_secs(1)).await);
        server.shutdown().await;
        server.wait_terminated().await;
    }
}
