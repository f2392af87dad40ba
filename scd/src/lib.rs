//! SCD2 merge engine for the historized order dimension.
//!
//! A merge run reads a staged batch from a [`source::StagingSource`], normalizes it into one
//! [`types::Candidate`] per order, fingerprints the tracked attributes of each candidate and
//! compares them with the current versions held by a [`store::HistorizedStore`]. New orders get
//! a first version, changed orders get their current version closed and a new one appended,
//! and unchanged orders are left alone. All writes of a run are applied as one unit.
//!
//! [`merge::Scd2Merger`] drives a run end to end.

pub mod error;
pub mod failpoints;
pub mod fingerprint;
pub mod keys;
mod macros;
pub mod merge;
pub mod metrics;
pub mod source;
pub mod staging;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
