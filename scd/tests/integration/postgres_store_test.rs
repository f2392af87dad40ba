use std::collections::HashMap;

use config::shared::MergeConfig;
use scd::error::ErrorKind;
use scd::fingerprint::compute_fingerprint;
use scd::keys::SurrogateKeyAllocator;
use scd::merge::{Scd2Merger, plan_merge, verify_history};
use scd::source::StagingSource;
use scd::staging::normalize_batch;
use scd::store::HistorizedStore;
use scd::test_utils::database::spawn_test_database;
use scd::test_utils::fixtures::{StagedRecordBuilder, at, staged};
use scd::types::VALID_TO_SENTINEL;
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn new_order_is_stored_as_current_version() {
    init_test_tracing();
    let Some(database) = spawn_test_database().await else {
        return;
    };
    database
        .stage(&[staged("order-1", "processing", "2024-01-01 06:00:00")])
        .await;
    let merger = Scd2Merger::new(
        database.store(),
        database.staging_source(false),
        MergeConfig::default(),
    );

    let summary = merger.run().await.unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.allocated_keys, Some(1..=1));

    let history = merger.store().history("order-1").await.unwrap();
    assert_eq!(history.len(), 1);
    let version = &history[0];
    assert_eq!(version.surrogate_key, 1);
    assert!(version.is_current);
    assert_eq!(version.valid_from, at("2024-01-01 06:00:00"));
    assert_eq!(version.valid_to, *VALID_TO_SENTINEL);
    assert_eq!(
        version.content_fingerprint,
        compute_fingerprint(&version.tracked)
    );
    assert_eq!(database.staged_count().await, 1);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_order_closes_current_version_in_one_transaction() {
    init_test_tracing();
    let Some(database) = spawn_test_database().await else {
        return;
    };
    let merger = Scd2Merger::new(
        database.store(),
        database.staging_source(false),
        MergeConfig::default(),
    );
    merger
        .merge_records(&[
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-2", "processing", "2024-01-01 06:00:00"),
        ])
        .await
        .unwrap();

    let summary = merger
        .merge_records(&[StagedRecordBuilder::new("order-1")
            .status("shipped")
            .delivered_carrier_at("2024-01-03 09:30:00")
            .loaded_at("2024-01-04 06:00:00")
            .build()])
        .await
        .unwrap();

    assert_eq!(summary.changed, 1);
    assert_eq!(summary.allocated_keys, Some(3..=3));

    let store = merger.store();
    let history = store.history("order-1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].is_current);
    assert_eq!(history[0].valid_to, at("2024-01-04 06:00:00"));
    assert_eq!(history[0].content_fingerprint, history[1].content_fingerprint);
    assert!(history[1].is_current);
    assert_eq!(history[1].surrogate_key, 3);
    verify_history("order-1", &history).unwrap();

    assert_eq!(store.current_snapshot().await.unwrap().len(), 2);
    assert_eq!(store.count_versions().await.unwrap(), 3);
    assert_eq!(
        store
            .versions_valid_at(at("2024-01-02 00:00:00"))
            .await
            .unwrap()
            .len(),
        2
    );

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_order_leaves_history_unchanged() {
    init_test_tracing();
    let Some(database) = spawn_test_database().await else {
        return;
    };
    let merger = Scd2Merger::new(
        database.store(),
        database.staging_source(false),
        MergeConfig::default(),
    );
    merger
        .merge_records(&[staged("order-1", "processing", "2024-01-01 06:00:00")])
        .await
        .unwrap();
    let before = merger.store().history("order-1").await.unwrap();

    let summary = merger
        .merge_records(&[staged("order-1", "processing", "2024-01-02 06:00:00")])
        .await
        .unwrap();

    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.allocated_keys, None);
    assert_eq!(merger.store().history("order-1").await.unwrap(), before);
    assert_eq!(merger.store().max_surrogate_key().await.unwrap(), Some(1));

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn plan_built_against_outdated_table_is_a_write_conflict() {
    init_test_tracing();
    let Some(database) = spawn_test_database().await else {
        return;
    };
    let store = database.store();

    let batch = normalize_batch(&[staged("order-1", "processing", "2024-01-01 06:00:00")]);
    let allocator = SurrogateKeyAllocator::seeded(store.max_surrogate_key().await.unwrap());
    let plan = plan_merge(&batch.candidates, &HashMap::new(), &allocator).unwrap();

    store.apply_merge_plan(&plan).await.unwrap();
    let err = store.apply_merge_plan(&plan).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WriteConflict);
    assert!(err.is_retryable());
    assert_eq!(store.count_versions().await.unwrap(), 1);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn merged_staged_orders_are_cleared_when_configured() {
    init_test_tracing();
    let Some(database) = spawn_test_database().await else {
        return;
    };
    database
        .stage(&[
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-2", "processing", "2024-01-01 06:00:00"),
        ])
        .await;
    let merger = Scd2Merger::new(
        database.store(),
        database.staging_source(true),
        MergeConfig::default(),
    );

    let summary = merger.run().await.unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(database.staged_count().await, 0);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn clearing_keeps_rows_that_replaced_the_merged_ones() {
    init_test_tracing();
    let Some(database) = spawn_test_database().await else {
        return;
    };
    let source = database.staging_source(true);
    database
        .stage(&[staged("order-1", "processing", "2024-01-01 06:00:00")])
        .await;
    let batch = source.fetch_batch().await.unwrap();

    // After a truncate the next row lands at the same physical position.
    sqlx::query("truncate staging.orders")
        .execute(&database.pool)
        .await
        .unwrap();
    database
        .stage(&[staged("order-2", "processing", "2024-01-02 06:00:00")])
        .await;

    source.complete_batch(&batch).await.unwrap();

    let remaining = source.fetch_batch().await.unwrap();
    assert_eq!(remaining.records.len(), 1);
    assert_eq!(remaining.records[0].order_id.as_deref(), Some("order-2"));

    database.drop_database().await;
}
