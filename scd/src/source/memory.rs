use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::ScdResult;
use crate::source::base::{StagedBatch, StagingSource};
use crate::staging::RawStagedRecord;

#[derive(Debug, Default)]
struct Inner {
    next_row_id: u64,
    rows: Vec<(u64, RawStagedRecord)>,
}

/// In-memory staging area, filled by the caller.
#[derive(Debug, Clone, Default)]
pub struct MemoryStagingSource {
    inner: Arc<Mutex<Inner>>,
    clear_after_merge: bool,
}

impl MemoryStagingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes merged records from the staging area once their batch completes.
    pub fn clearing_after_merge(mut self) -> Self {
        self.clear_after_merge = true;
        self
    }

    /// Appends records to the staging area.
    pub async fn stage(&self, records: impl IntoIterator<Item = RawStagedRecord>) {
        let mut inner = self.inner.lock().await;

        for record in records {
            let row_id = inner.next_row_id;
            inner.next_row_id += 1;
            inner.rows.push((row_id, record));
        }
    }

    pub async fn staged_count(&self) -> usize {
        self.inner.lock().await.rows.len()
    }
}

impl StagingSource for MemoryStagingSource {
    async fn fetch_batch(&self) -> ScdResult<StagedBatch> {
        let inner = self.inner.lock().await;

        let (row_ids, records): (Vec<String>, Vec<RawStagedRecord>) = inner
            .rows
            .iter()
            .map(|(row_id, record)| (row_id.to_string(), record.clone()))
            .unzip();

        Ok(StagedBatch { records, row_ids })
    }

    async fn complete_batch(&self, batch: &StagedBatch) -> ScdResult<()> {
        if !self.clear_after_merge {
            return Ok(());
        }

        let merged: HashSet<&str> = batch.row_ids.iter().map(String::as_str).collect();

        let mut inner = self.inner.lock().await;
        inner
            .rows
            .retain(|(row_id, _)| !merged.contains(row_id.to_string().as_str()));

        Ok(())
    }
}
