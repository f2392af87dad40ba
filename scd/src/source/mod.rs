//! Sources of staged batches.

mod base;
mod memory;
mod postgres;

pub use base::{StagedBatch, StagingSource};
pub use memory::MemoryStagingSource;
pub use self::postgres::PostgresStagingSource;
