// isrv-common - Shared types and protocol definitions for IndicatorServe
//
// This crate defines the wire protocol, the error taxonomy and the
// configuration model shared by the server, the cache and the client.

pub mod config;
pub mod error;
pub mod protocol;

// Re-export for convenience
pub use config::*;
pub use error::*;
