//! Historized store abstraction and its implementations.

mod base;
mod memory;
mod postgres;

pub use base::{AppliedPlan, HistorizedStore};
pub use memory::MemoryStore;
pub use self::postgres::PostgresStore;
