//! # IndicatorServe Error Types
//!
//! ## Design Principles
//!
//! 1. **Stable Codes**: Each variant maps to a fixed numeric code for log correlation.
//! 2. **Categorized Ranges**: Codes are grouped by intent (client, server, transient, protocol).
//! 3. **Contained Failures**: Errors describe one scope (a connection, a sweep, a load);
//!    nothing here is meant to unwind into the accept loop.
//! 4. **Recoverability Hints**: Transient errors are explicitly marked as retryable.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type used across IndicatorServe components.
pub type IsrvResult<T> = core::result::Result<T, IsrvError>;

/// High-level category for grouping error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IsrvErrorCategory {
    /// Invalid input or configuration supplied by the operator or client.
    Client,
    /// Server-side resource or invariant failures.
    Server,
    /// Retryable conditions such as I/O hiccups.
    Transient,
    /// Wire-protocol violations.
    Protocol,
}

impl IsrvErrorCategory {
    /// Returns true if the category is safe to retry.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Errors surfaced by the cache, dataset, pool and lifecycle layers.
#[derive(Debug, Error)]
pub enum IsrvError {
    /// Client error: configuration rejected by validation (code 1).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Client error: dataset file could not be parsed (code 2).
    #[error("dataset error at line {line}: {reason}")]
    Dataset { line: usize, reason: String },

    /// Server error: the listening socket could not be bound (code 10).
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Server error: the worker pool no longer accepts submissions (code 11).
    #[error("worker pool is shut down")]
    PoolClosed,

    /// Transient error: socket or file I/O failed (code 20).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error: request line exceeded the maximum length (code 30).
    #[error("request line exceeds {0} bytes")]
    LineTooLong(usize),
}

impl IsrvError {
    /// Returns the stable numeric code for the error.
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidConfig(_) => 1,
            Self::Dataset { .. } => 2,
            Self::Bind { .. } => 10,
            Self::PoolClosed => 11,
            Self::Io(_) => 20,
            Self::LineTooLong(_) => 30,
        }
    }

    /// Returns the coarse category of the error.
    pub const fn category(&self) -> IsrvErrorCategory {
        match self {
            Self::InvalidConfig(_) | Self::Dataset { .. } => IsrvErrorCategory::Client,
            Self::Bind { .. } | Self::PoolClosed => IsrvErrorCategory::Server,
            Self::Io(_) => IsrvErrorCategory::Transient,
            Self::LineTooLong(_) => IsrvErrorCategory::Protocol,
        }
    }

    /// Returns true if callers should retry the operation.
    pub const fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}
