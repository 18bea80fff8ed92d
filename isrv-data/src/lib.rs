//! # Indicator Dataset
//!
//! Read-only data access for the request handlers.
//!
//! ## Design Principles
//!
//! 1. **Strategy Pattern**: Handlers talk to the [`Dataset`] trait, so tests can
//!    swap in a tiny in-memory table without touching the server.
//! 2. **Load Once**: The table is parsed at startup and never mutated, so it is
//!    shared across worker tasks without locking.
//! 3. **Total Answers**: Every lookup returns a response line; unknown series
//!    produce a readable message instead of an error.

pub mod csv;
pub mod table;

pub use table::{WdiRecord, WdiTable};

/// Answers the bodies of query and report commands.
pub trait Dataset: Send + Sync {
    /// All values of one series: `<country>;<indicator>;<v1>;...;<vN>`.
    fn query(&self, country: &str, indicator: &str) -> String;

    /// One value of a series: `<country>;<indicator>;<year>;<value>`.
    fn query_year(&self, country: &str, indicator: &str, year: u16) -> String;

    /// Per-country means of an indicator: `<country>;<mean>;...`.
    fn report(&self, indicator: &str) -> String;
}
