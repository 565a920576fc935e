//! Tracing/logging setup shared by everything embedding the ledger engine.

/// Subscriber configuration (filters, layers).
pub mod subscriber;

pub use subscriber::{DEFAULT_FILTER, init, init_for_tests, init_with};
