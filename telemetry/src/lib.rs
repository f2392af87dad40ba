//! Logging and metrics initialization shared by the merger binary and the test suites.

pub mod metrics;
pub mod tracing;

pub use crate::tracing::{LogFlusher, init_test_tracing, init_tracing};
