use config::shared::MergeConfig;
use scd::merge::Scd2Merger;
use scd::source::MemoryStagingSource;
use scd::store::{HistorizedStore, MemoryStore};
use scd::test_utils::fixtures::{at, staged};
use scd::test_utils::invariants::assert_store_invariants;
use telemetry::init_test_tracing;

fn memory_merger() -> Scd2Merger<MemoryStore, MemoryStagingSource> {
    Scd2Merger::new(
        MemoryStore::new(),
        MemoryStagingSource::new().clearing_after_merge(),
        MergeConfig::default(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn rerunning_the_same_batch_is_idempotent() {
    init_test_tracing();
    let merger = memory_merger();
    let batch = [
        staged("order-1", "processing", "2024-01-01 06:00:00"),
        staged("order-2", "shipped", "2024-01-01 06:00:00"),
    ];

    merger.merge_records(&batch).await.unwrap();
    let after_first = merger.store().all_versions().await;

    let summary = merger.merge_records(&batch).await.unwrap();

    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.mutated_rows(), 0);
    assert_eq!(merger.store().all_versions().await, after_first);
}

#[tokio::test(flavor = "multi_thread")]
async fn order_lifecycle_builds_contiguous_history() {
    init_test_tracing();
    let merger = memory_merger();
    let lifecycle = [
        ("created", "2024-01-01 06:00:00"),
        ("approved", "2024-01-02 06:00:00"),
        ("shipped", "2024-01-04 06:00:00"),
        ("delivered", "2024-01-09 06:00:00"),
    ];

    for (status, load_timestamp) in lifecycle {
        merger
            .source()
            .stage([staged("order-1", status, load_timestamp)])
            .await;
        merger.run().await.unwrap();
    }

    let history = merger.store().history("order-1").await.unwrap();
    assert_eq!(history.len(), 4);

    let statuses: Vec<_> = history
        .iter()
        .map(|v| v.tracked.status.as_deref().unwrap())
        .collect();
    assert_eq!(statuses, ["created", "approved", "shipped", "delivered"]);

    for pair in history.windows(2) {
        assert_eq!(pair[0].valid_to, pair[1].valid_from);
        assert!(pair[0].surrogate_key < pair[1].surrogate_key);
    }
    assert_eq!(history.iter().filter(|v| v.is_current).count(), 1);
    assert_eq!(merger.source().staged_count().await, 0);

    assert_store_invariants(merger.store()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn surrogate_keys_keep_increasing_across_runs() {
    init_test_tracing();
    let merger = memory_merger();

    let first = merger
        .merge_records(&[
            staged("order-b", "processing", "2024-01-01 06:00:00"),
            staged("order-a", "processing", "2024-01-01 06:00:00"),
        ])
        .await
        .unwrap();
    assert_eq!(first.allocated_keys, Some(1..=2));

    // Keys follow natural key order within a run.
    let store = merger.store();
    let a = store.current_version("order-a").await.unwrap().unwrap();
    let b = store.current_version("order-b").await.unwrap().unwrap();
    assert_eq!((a.surrogate_key, b.surrogate_key), (1, 2));

    let second = merger
        .merge_records(&[
            staged("order-a", "shipped", "2024-01-02 06:00:00"),
            staged("order-c", "processing", "2024-01-02 06:00:00"),
        ])
        .await
        .unwrap();
    assert_eq!(second.allocated_keys, Some(3..=4));

    let third = merger
        .merge_records(&[staged("order-b", "cancelled", "2024-01-03 06:00:00")])
        .await
        .unwrap();
    assert_eq!(third.allocated_keys, Some(5..=5));

    let keys: Vec<_> = store
        .all_versions()
        .await
        .iter()
        .map(|v| v.surrogate_key)
        .collect();
    assert_eq!(keys, [1, 2, 3, 4, 5]);
    assert_eq!(store.max_surrogate_key().await.unwrap(), Some(5));

    assert_store_invariants(store).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn latest_duplicate_in_a_batch_wins() {
    init_test_tracing();
    let merger = memory_merger();

    let summary = merger
        .merge_records(&[
            staged("order-1", "delivered", "2024-01-03 06:00:00"),
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-1", "shipped", "2024-01-02 06:00:00"),
        ])
        .await
        .unwrap();

    assert_eq!(summary.collapsed_duplicates, 2);
    assert_eq!(summary.inserted, 1);

    let current = merger
        .store()
        .current_version("order-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.tracked.status.as_deref(), Some("delivered"));
    assert_eq!(current.valid_from, at("2024-01-03 06:00:00"));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicates_with_equal_load_time_keep_the_later_record() {
    init_test_tracing();
    let merger = memory_merger();

    merger
        .merge_records(&[
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-1", "shipped", "2024-01-01 06:00:00"),
        ])
        .await
        .unwrap();

    let current = merger
        .store()
        .current_version("order-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.tracked.status.as_deref(), Some("shipped"));
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_record_older_than_current_version_is_skipped() {
    init_test_tracing();
    let merger = memory_merger();
    merger
        .merge_records(&[staged("order-1", "shipped", "2024-01-05 06:00:00")])
        .await
        .unwrap();

    let summary = merger
        .merge_records(&[
            staged("order-1", "processing", "2024-01-02 06:00:00"),
            staged("order-2", "processing", "2024-01-02 06:00:00"),
        ])
        .await
        .unwrap();

    assert_eq!(summary.stale, 1);
    assert_eq!(summary.inserted, 1);

    let history = merger.store().history("order-1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].tracked.status.as_deref(), Some("shipped"));

    assert_store_invariants(merger.store()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_reports_plan_without_writing() {
    init_test_tracing();
    let merger = Scd2Merger::new(
        MemoryStore::new(),
        MemoryStagingSource::new().clearing_after_merge(),
        MergeConfig {
            dry_run: true,
            ..Default::default()
        },
    );
    merger
        .source()
        .stage([
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-2", "processing", "2024-01-01 06:00:00"),
        ])
        .await;

    let summary = merger.run().await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.allocated_keys, Some(1..=2));
    assert_eq!(merger.store().count_versions().await.unwrap(), 0);
    assert_eq!(merger.source().staged_count().await, 2);
}
