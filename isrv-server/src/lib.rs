//! # Indicator Server
//!
//! Line-oriented TCP server answering World Development Indicator queries.
//!
//! ## Design Principles
//!
//! 1. **Single Responsibility**: Framing, dispatch, pooling and lifecycle live
//!    in separate modules.
//! 2. **Async First**: Tokio drives the acceptor and the worker pool.
//! 3. **Fail-Open Defaults**: A broken request only affects its own connection.

pub(crate) mod acceptor;
pub mod command;
pub mod connection;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod server;

pub use command::Command;
pub use metrics::{Metrics, MetricsSnapshot};
pub use pool::{PoolStats, WorkerPool};
pub use server::{LifecycleState, Server};
