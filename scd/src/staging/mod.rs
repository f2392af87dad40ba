//! Staged input records and their normalization into merge candidates.

mod normalizer;
mod record;
mod timestamp;

pub use normalizer::{NormalizedBatch, RejectReason, RejectedRecord, normalize_batch, normalize_record};
pub use record::{RawStagedRecord, StagingColumn};
pub use timestamp::parse_timestamp;
