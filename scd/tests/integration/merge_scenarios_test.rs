use config::shared::MergeConfig;
use scd::fingerprint::compute_fingerprint;
use scd::merge::Scd2Merger;
use scd::source::MemoryStagingSource;
use scd::store::{HistorizedStore, MemoryStore};
use scd::test_utils::fixtures::{StagedRecordBuilder, at, header_row, staged};
use scd::test_utils::invariants::assert_store_invariants;
use scd::types::VALID_TO_SENTINEL;
use telemetry::init_test_tracing;

fn memory_merger() -> Scd2Merger<MemoryStore, MemoryStagingSource> {
    Scd2Merger::new(
        MemoryStore::new(),
        MemoryStagingSource::new(),
        MergeConfig::default(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn new_order_is_inserted_as_current_version() {
    init_test_tracing();
    let merger = memory_merger();

    let summary = merger
        .merge_records(&[staged("order-1", "processing", "2024-01-01 06:00:00")])
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.allocated_keys, Some(1..=1));

    let history = merger.store().history("order-1").await.unwrap();
    assert_eq!(history.len(), 1);

    let version = &history[0];
    assert_eq!(version.surrogate_key, 1);
    assert!(version.is_current);
    assert_eq!(version.valid_from, at("2024-01-01 06:00:00"));
    assert_eq!(version.valid_to, *VALID_TO_SENTINEL);
    assert_eq!(version.tracked.status.as_deref(), Some("processing"));
    assert_eq!(
        version.customer_reference.as_deref(),
        Some("customer-of-order-1")
    );
    assert_eq!(
        version.content_fingerprint,
        compute_fingerprint(&version.tracked)
    );

    assert_store_invariants(merger.store()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_order_closes_current_version_and_inserts_new_one() {
    init_test_tracing();
    let merger = memory_merger();
    merger
        .merge_records(&[
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-2", "processing", "2024-01-01 06:00:00"),
        ])
        .await
        .unwrap();

    let summary = merger
        .merge_records(&[
            StagedRecordBuilder::new("order-1")
                .status("shipped")
                .delivered_carrier_at("2024-01-03 09:30:00")
                .loaded_at("2024-01-04 06:00:00")
                .build(),
        ])
        .await
        .unwrap();

    assert_eq!(summary.changed, 1);
    assert_eq!(summary.allocated_keys, Some(3..=3));

    let history = merger.store().history("order-1").await.unwrap();
    assert_eq!(history.len(), 2);

    let (closed, current) = (&history[0], &history[1]);
    assert_eq!(closed.surrogate_key, 1);
    assert!(!closed.is_current);
    assert_eq!(closed.valid_to, at("2024-01-04 06:00:00"));
    assert_eq!(closed.tracked.status.as_deref(), Some("processing"));

    assert_eq!(current.surrogate_key, 3);
    assert!(current.is_current);
    assert_eq!(current.valid_from, closed.valid_to);
    assert_eq!(current.valid_to, *VALID_TO_SENTINEL);
    assert_eq!(current.tracked.status.as_deref(), Some("shipped"));
    assert_eq!(
        current.tracked.delivered_carrier_at,
        Some(at("2024-01-03 09:30:00"))
    );

    // Untouched keys keep their only version.
    let other = merger.store().history("order-2").await.unwrap();
    assert_eq!(other.len(), 1);
    assert!(other[0].is_current);

    assert_store_invariants(merger.store()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_order_is_a_no_op() {
    init_test_tracing();
    let merger = memory_merger();
    merger
        .merge_records(&[staged("order-1", "delivered", "2024-01-01 06:00:00")])
        .await
        .unwrap();
    let before = merger.store().all_versions().await;

    let summary = merger
        .merge_records(&[staged("order-1", "delivered", "2024-01-02 06:00:00")])
        .await
        .unwrap();

    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.mutated_rows(), 0);
    assert_eq!(summary.allocated_keys, None);
    assert_eq!(merger.store().all_versions().await, before);
}

#[tokio::test(flavor = "multi_thread")]
async fn customer_reference_change_alone_is_not_a_new_version() {
    init_test_tracing();
    let merger = memory_merger();
    merger
        .merge_records(&[staged("order-1", "delivered", "2024-01-01 06:00:00")])
        .await
        .unwrap();

    let summary = merger
        .merge_records(&[
            StagedRecordBuilder::new("order-1")
                .status("delivered")
                .customer("someone-else")
                .loaded_at("2024-01-02 06:00:00")
                .build(),
        ])
        .await
        .unwrap();

    assert_eq!(summary.unchanged, 1);
    assert_eq!(merger.store().count_versions().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn records_with_malformed_load_time_are_excluded() {
    init_test_tracing();
    let merger = memory_merger();

    let summary = merger
        .merge_records(&[
            staged("order-1", "processing", "yesterday"),
            StagedRecordBuilder::new("order-2")
                .without_load_timestamp()
                .build(),
            staged("order-3", "processing", "2024-01-01 06:00:00"),
        ])
        .await
        .unwrap();

    assert_eq!(summary.staged, 3);
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.inserted, 1);

    let store = merger.store();
    assert!(store.current_version("order-1").await.unwrap().is_none());
    assert!(store.current_version("order-2").await.unwrap().is_none());
    assert!(store.current_version("order-3").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn header_row_is_excluded() {
    init_test_tracing();
    let merger = memory_merger();

    let summary = merger
        .merge_records(&[
            header_row(),
            staged("order-1", "processing", "2024-01-01 06:00:00"),
        ])
        .await
        .unwrap();

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(merger.store().count_versions().await.unwrap(), 1);
    assert!(
        merger
            .store()
            .current_version("order_id")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_of_only_rejected_records_writes_nothing() {
    init_test_tracing();
    let merger = memory_merger();

    let summary = merger
        .merge_records(&[header_row(), staged("order-1", "processing", "n/a")])
        .await
        .unwrap();

    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.mutated_rows(), 0);
    assert_eq!(merger.store().max_surrogate_key().await.unwrap(), None);
}
