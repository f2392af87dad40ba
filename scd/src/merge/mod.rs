//! Planning and execution of SCD2 merge runs.

mod executor;
mod plan;
mod verify;

pub use executor::{MergeSummary, Scd2Merger};
pub use plan::{MergeAction, MergePlan, StaleRecord, VersionClose, plan_merge};
pub use verify::{verify_history, verify_unique_surrogate_keys};
