use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{NaiveDate, NaiveDateTime};
use config::shared::MergeConfig;
use scd::error::{ErrorKind, ScdResult};
use scd::keys::SurrogateKeyAllocator;
use scd::merge::{MergePlan, Scd2Merger, plan_merge};
use scd::source::MemoryStagingSource;
use scd::staging::{RawStagedRecord, normalize_batch};
use scd::store::{AppliedPlan, HistorizedStore, MemoryStore};
use scd::types::{OrderVersion, SurrogateKey};
use scd::test_utils::fault_store::{FaultConfig, FaultInjectingStore, FaultType};
use scd::test_utils::fixtures::staged;
use scd::test_utils::invariants::assert_store_invariants;
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn plan_built_against_outdated_state_is_rejected() {
    init_test_tracing();
    let store = MemoryStore::new();

    let batch = normalize_batch(&[staged("order-1", "processing", "2024-01-01 06:00:00")]);
    let allocator = SurrogateKeyAllocator::seeded(store.max_surrogate_key().await.unwrap());
    let plan = plan_merge(&batch.candidates, &HashMap::new(), &allocator).unwrap();

    store.apply_merge_plan(&plan).await.unwrap();

    // A second writer computed the same plan before the first one landed.
    let err = store.apply_merge_plan(&plan).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WriteConflict);
    assert!(err.is_retryable());
    assert_eq!(store.count_versions().await.unwrap(), 1);
    assert_store_invariants(&store).await;
}

/// Store that lets another writer merge a batch right after the first lookup of current versions.
struct RacingStore {
    inner: MemoryStore,
    competing_batch: Vec<RawStagedRecord>,
    raced: AtomicBool,
}

impl RacingStore {
    fn new(inner: MemoryStore, competing_batch: Vec<RawStagedRecord>) -> Self {
        Self {
            inner,
            competing_batch,
            raced: AtomicBool::new(false),
        }
    }
}

impl HistorizedStore for RacingStore {
    async fn current_version(&self, natural_key: &str) -> ScdResult<Option<OrderVersion>> {
        self.inner.current_version(natural_key).await
    }

    async fn current_versions(
        &self,
        natural_keys: &[String],
    ) -> ScdResult<HashMap<String, OrderVersion>> {
        let current = self.inner.current_versions(natural_keys).await?;

        if !self.raced.swap(true, Ordering::SeqCst) {
            Scd2Merger::new(
                self.inner.clone(),
                MemoryStagingSource::new(),
                MergeConfig::default(),
            )
            .merge_records(&self.competing_batch)
            .await?;
        }

        Ok(current)
    }

    async fn current_snapshot(&self) -> ScdResult<Vec<OrderVersion>> {
        self.inner.current_snapshot().await
    }

    async fn max_surrogate_key(&self) -> ScdResult<Option<SurrogateKey>> {
        self.inner.max_surrogate_key().await
    }

    async fn apply_merge_plan(&self, plan: &MergePlan) -> ScdResult<AppliedPlan> {
        self.inner.apply_merge_plan(plan).await
    }

    async fn history(&self, natural_key: &str) -> ScdResult<Vec<OrderVersion>> {
        self.inner.history(natural_key).await
    }

    async fn versions_valid_at(&self, instant: NaiveDateTime) -> ScdResult<Vec<OrderVersion>> {
        self.inner.versions_valid_at(instant).await
    }

    async fn versions_starting_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ScdResult<Vec<OrderVersion>> {
        self.inner.versions_starting_between(from, to).await
    }

    async fn count_versions(&self) -> ScdResult<u64> {
        self.inner.count_versions().await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn write_racing_between_lookups_is_a_retryable_conflict() {
    init_test_tracing();
    let inner = MemoryStore::new();
    let racing = Scd2Merger::new(
        RacingStore::new(
            inner.clone(),
            vec![staged("order-1", "processing", "2024-01-01 06:00:00")],
        ),
        MemoryStagingSource::new(),
        MergeConfig::default(),
    );
    let batch = [
        staged("order-1", "shipped", "2024-01-02 06:00:00"),
        staged("order-2", "processing", "2024-01-02 06:00:00"),
    ];

    let err = racing.merge_records(&batch).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WriteConflict);
    assert!(err.is_retryable());
    assert_eq!(inner.count_versions().await.unwrap(), 1);

    // Retrying after the competing writer is done plans against the new state.
    let summary = racing.merge_records(&batch).await.unwrap();

    assert_eq!(summary.changed, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.allocated_keys, Some(2..=3));
    assert_eq!(inner.history("order-1").await.unwrap().len(), 2);
    assert_store_invariants(&inner).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_lookup_aborts_run_and_keeps_staged_records() {
    init_test_tracing();
    let store = FaultInjectingStore::wrap(
        MemoryStore::new(),
        FaultConfig {
            current_versions: Some(FaultType::Error),
            ..Default::default()
        },
    );
    let source = MemoryStagingSource::new().clearing_after_merge();
    source
        .stage([staged("order-1", "processing", "2024-01-01 06:00:00")])
        .await;
    let merger = Scd2Merger::new(store, source, MergeConfig::default());

    let err = merger.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreConnectionFailed);
    assert!(err.is_retryable());
    assert_eq!(merger.source().staged_count().await, 1);
    assert_eq!(merger.store().inner().count_versions().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_apply_leaves_history_untouched_and_rerun_succeeds() {
    init_test_tracing();
    let inner = MemoryStore::new();
    let seeding = Scd2Merger::new(
        inner.clone(),
        MemoryStagingSource::new(),
        MergeConfig::default(),
    );
    seeding
        .merge_records(&[staged("order-1", "processing", "2024-01-01 06:00:00")])
        .await
        .unwrap();
    let before = inner.all_versions().await;

    let failing = Scd2Merger::new(
        FaultInjectingStore::wrap(
            inner.clone(),
            FaultConfig {
                apply_merge_plan: Some(FaultType::Error),
                ..Default::default()
            },
        ),
        MemoryStagingSource::new(),
        MergeConfig::default(),
    );
    let batch = [
        staged("order-1", "shipped", "2024-01-02 06:00:00"),
        staged("order-2", "processing", "2024-01-02 06:00:00"),
    ];

    failing.merge_records(&batch).await.unwrap_err();
    assert_eq!(inner.all_versions().await, before);

    let summary = seeding.merge_records(&batch).await.unwrap();

    assert_eq!(summary.changed, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.allocated_keys, Some(2..=3));
    assert_store_invariants(&inner).await;
}

#[tokio::test(flavor = "multi_thread")]
#[should_panic(expected = "injected panic in max_surrogate_key")]
async fn panicking_store_propagates_panic() {
    init_test_tracing();
    let merger = Scd2Merger::new(
        FaultInjectingStore::wrap(
            MemoryStore::new(),
            FaultConfig {
                max_surrogate_key: Some(FaultType::Panic),
                ..Default::default()
            },
        ),
        MemoryStagingSource::new(),
        MergeConfig::default(),
    );

    let _ = merger
        .merge_records(&[staged("order-1", "processing", "2024-01-01 06:00:00")])
        .await;
}
