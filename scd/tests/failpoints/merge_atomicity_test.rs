use config::shared::MergeConfig;
use scd::error::ErrorKind;
use scd::failpoints::{APPLY_PLAN__BETWEEN_CLOSE_AND_INSERT, MERGE_RUN__BEFORE_APPLY};
use scd::merge::Scd2Merger;
use scd::source::MemoryStagingSource;
use scd::store::{HistorizedStore, MemoryStore};
use scd::test_utils::failpoints::CustomFailScenario;
use scd::test_utils::fixtures::staged;
use scd::test_utils::invariants::assert_store_invariants;
use telemetry::init_test_tracing;

async fn seeded_merger() -> Scd2Merger<MemoryStore, MemoryStagingSource> {
    let merger = Scd2Merger::new(
        MemoryStore::new(),
        MemoryStagingSource::new().clearing_after_merge(),
        MergeConfig::default(),
    );
    merger
        .merge_records(&[
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-2", "processing", "2024-01-01 06:00:00"),
        ])
        .await
        .unwrap();

    merger
}

fn changing_batch() -> Vec<scd::staging::RawStagedRecord> {
    vec![
        staged("order-1", "shipped", "2024-01-02 06:00:00"),
        staged("order-2", "cancelled", "2024-01-02 06:00:00"),
        staged("order-3", "processing", "2024-01-02 06:00:00"),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_between_close_and_insert_leaves_no_partial_write() {
    init_test_tracing();
    let merger = seeded_merger().await;
    let before = merger.store().all_versions().await;

    {
        let _scenario =
            CustomFailScenario::setup(&[(APPLY_PLAN__BETWEEN_CLOSE_AND_INSERT, "return")]);

        let err = merger.merge_records(&changing_batch()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::WithNoRetry);
        assert!(!err.is_retryable());
    }

    // No version was closed without its successor being inserted.
    assert_eq!(merger.store().all_versions().await, before);
    assert_store_invariants(merger.store()).await;

    let summary = merger.merge_records(&changing_batch()).await.unwrap();
    assert_eq!(summary.changed, 2);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.allocated_keys, Some(3..=5));
    assert_store_invariants(merger.store()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_before_apply_keeps_staged_batch() {
    init_test_tracing();
    let merger = seeded_merger().await;
    merger.source().stage(changing_batch()).await;

    {
        let _scenario = CustomFailScenario::setup(&[(MERGE_RUN__BEFORE_APPLY, "return")]);

        let err = merger.run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WithNoRetry);
    }

    assert_eq!(merger.source().staged_count().await, 3);
    assert_eq!(merger.store().count_versions().await.unwrap(), 2);

    let summary = merger.run().await.unwrap();
    assert_eq!(summary.mutated_rows(), 5);
    assert_eq!(merger.source().staged_count().await, 0);
}
