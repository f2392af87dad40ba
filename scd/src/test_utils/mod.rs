//! Helpers for testing merge runs: staged record builders, a fault injecting store wrapper,
//! per-test databases and failpoint scenarios.

#[cfg(feature = "test-utils")]
pub mod database;
pub mod fault_store;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod fixtures;
pub mod invariants;
