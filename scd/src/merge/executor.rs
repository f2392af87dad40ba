use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use config::shared::MergeConfig;
use metrics::{counter, gauge, histogram};
use tracing::{debug, error, info, warn};

use crate::error::{ScdError, ScdResult};
use crate::failpoints::{MERGE_RUN__BEFORE_APPLY, scd_fail_point};
use crate::keys::SurrogateKeyAllocator;
use crate::merge::plan::{MergeAction, MergePlan, plan_merge};
use crate::merge::verify::verify_history;
use crate::metrics::{
    ERROR_KIND_LABEL, OUTCOME_LABEL, SCD_MAX_SURROGATE_KEY, SCD_MERGE_DURATION_SECONDS,
    SCD_MERGE_RECORDS_TOTAL, SCD_MERGE_RUNS_TOTAL, STATUS_LABEL,
};
use crate::source::StagingSource;
use crate::staging::{NormalizedBatch, RawStagedRecord, normalize_batch};
use crate::store::HistorizedStore;
use crate::types::SurrogateKey;

/// Outcome of one merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records in the staged batch.
    pub staged: usize,
    /// Records excluded by normalization.
    pub rejected: usize,
    /// Records dropped in favour of a newer record with the same natural key.
    pub collapsed_duplicates: usize,
    /// Natural keys seen for the first time.
    pub inserted: usize,
    /// Natural keys whose current version was superseded.
    pub changed: usize,
    pub unchanged: usize,
    /// Changed records not newer than their current version, left unapplied.
    pub stale: usize,
    /// Surrogate keys assigned to new versions.
    pub allocated_keys: Option<RangeInclusive<SurrogateKey>>,
    /// Set when the plan was built but not applied.
    pub dry_run: bool,
    pub duration: Duration,
}

impl MergeSummary {
    /// Number of rows the run wrote or would write.
    pub fn mutated_rows(&self) -> usize {
        self.inserted + 2 * self.changed
    }

    fn new(
        normalized: &NormalizedBatch,
        plan: &MergePlan,
        allocator: &SurrogateKeyAllocator,
        dry_run: bool,
        started: Instant,
    ) -> Self {
        Self {
            staged: normalized.staged,
            rejected: normalized.rejected.len(),
            collapsed_duplicates: normalized.collapsed_duplicates,
            inserted: plan.count(MergeAction::Insert),
            changed: plan.count(MergeAction::Change),
            unchanged: plan.count(MergeAction::Unchanged),
            stale: plan.count(MergeAction::Stale),
            allocated_keys: allocator.allocated(),
            dry_run,
            duration: started.elapsed(),
        }
    }
}

/// Runs SCD2 merges of staged batches into a historized store.
#[derive(Debug, Clone)]
pub struct Scd2Merger<St, Src> {
    store: St,
    source: Src,
    config: MergeConfig,
}

impl<St, Src> Scd2Merger<St, Src>
where
    St: HistorizedStore,
    Src: StagingSource,
{
    pub fn new(store: St, source: Src, config: MergeConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn source(&self) -> &Src {
        &self.source
    }

    /// Merges the batch currently in the staging source.
    ///
    /// On success the batch is reported complete to the source. A failed run leaves the store
    /// untouched and can be repeated as a whole.
    pub async fn run(&self) -> ScdResult<MergeSummary> {
        let batch = self.source.fetch_batch().await?;

        info!(records = batch.len(), "starting merge run");

        let summary = self.merge_records(&batch.records).await?;

        if !summary.dry_run {
            self.source.complete_batch(&batch).await?;
        }

        Ok(summary)
    }

    /// Merges the given staged records.
    pub async fn merge_records(&self, records: &[RawStagedRecord]) -> ScdResult<MergeSummary> {
        let started = Instant::now();

        let result = self.try_merge_records(records, started).await;

        let status = match &result {
            Ok(summary) if summary.dry_run => "dry_run",
            Ok(_) => "applied",
            Err(err) => {
                counter!(
                    SCD_MERGE_RUNS_TOTAL,
                    STATUS_LABEL => "failed",
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);
                error!(error = %err, retryable = err.is_retryable(), "merge run failed");
                return result;
            }
        };

        counter!(SCD_MERGE_RUNS_TOTAL, STATUS_LABEL => status).increment(1);
        histogram!(SCD_MERGE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        result
    }

    async fn try_merge_records(
        &self,
        records: &[RawStagedRecord],
        started: Instant,
    ) -> ScdResult<MergeSummary> {
        let normalized = normalize_batch(records);

        let natural_keys: Vec<String> = normalized
            .candidates
            .iter()
            .map(|candidate| candidate.natural_key.clone())
            .collect();
        // The max is read first so that any write landing between the two reads moves it past
        // the plan's base and surfaces as a write conflict.
        let max_surrogate_key = self.store.max_surrogate_key().await?;
        let current = self.store.current_versions(&natural_keys).await?;
        let allocator = SurrogateKeyAllocator::seeded(max_surrogate_key);

        let plan = plan_merge(&normalized.candidates, &current, &allocator)?;

        for stale in &plan.stale {
            warn!(
                natural_key = %stale.natural_key,
                batch_load_time = %stale.batch_load_time,
                current_valid_from = %stale.current_valid_from,
                "skipping changed record not newer than the current version"
            );
        }

        debug!(
            closes = plan.closes.len(),
            inserts = plan.inserts.len(),
            base_max_surrogate_key = ?plan.base_max_surrogate_key,
            "built merge plan"
        );

        if self.config.dry_run {
            let summary = MergeSummary::new(&normalized, &plan, &allocator, true, started);
            info!(?summary, "dry run, merge plan not applied");
            return Ok(summary);
        }

        if !plan.is_empty() {
            scd_fail_point(MERGE_RUN__BEFORE_APPLY)?;

            let applied = self.store.apply_merge_plan(&plan).await?;
            debug!(
                closed = applied.closed,
                inserted = applied.inserted,
                "applied merge plan"
            );

            if self.config.verify_after_apply {
                self.verify_touched(&plan).await?;
            }
        }

        let summary = MergeSummary::new(&normalized, &plan, &allocator, false, started);
        record_summary_metrics(&summary);

        info!(
            staged = summary.staged,
            rejected = summary.rejected,
            collapsed_duplicates = summary.collapsed_duplicates,
            inserted = summary.inserted,
            changed = summary.changed,
            unchanged = summary.unchanged,
            stale = summary.stale,
            allocated_keys = ?summary.allocated_keys,
            duration_ms = summary.duration.as_millis() as u64,
            "merge run completed"
        );

        Ok(summary)
    }

    /// Re-reads the history of every natural key the plan wrote and checks its invariants.
    async fn verify_touched(&self, plan: &MergePlan) -> ScdResult<()> {
        let mut errors: Vec<ScdError> = Vec::new();

        for natural_key in plan.touched_natural_keys() {
            let history = self.store.history(natural_key).await?;
            if let Err(err) = verify_history(natural_key, &history) {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

fn record_summary_metrics(summary: &MergeSummary) {
    let outcomes = [
        (MergeAction::Insert.as_str(), summary.inserted),
        (MergeAction::Change.as_str(), summary.changed),
        (MergeAction::Unchanged.as_str(), summary.unchanged),
        (MergeAction::Stale.as_str(), summary.stale),
        ("rejected", summary.rejected),
        ("collapsed", summary.collapsed_duplicates),
    ];

    for (outcome, count) in outcomes {
        counter!(SCD_MERGE_RECORDS_TOTAL, OUTCOME_LABEL => outcome).increment(count as u64);
    }

    if let Some(keys) = &summary.allocated_keys {
        gauge!(SCD_MAX_SURROGATE_KEY).set(*keys.end() as f64);
    }
}
