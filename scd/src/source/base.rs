use std::future::Future;

use crate::error::ScdResult;
use crate::staging::RawStagedRecord;

/// A batch handed to a merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedBatch {
    pub records: Vec<RawStagedRecord>,
    /// Source-specific identifiers of the records, in the same order.
    pub row_ids: Vec<String>,
}

impl StagedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Where merge runs read their staged records from.
///
/// The ingestion job filling the source is external; a merge run only reads a batch and,
/// once the batch has been merged, reports it as complete.
pub trait StagingSource {
    /// Reads every currently staged record in staging order.
    fn fetch_batch(&self) -> impl Future<Output = ScdResult<StagedBatch>> + Send;

    /// Called after `batch` was merged successfully.
    ///
    /// Implementations configured to consume staged rows delete them here.
    fn complete_batch(&self, batch: &StagedBatch) -> impl Future<Output = ScdResult<()>> + Send;
}
