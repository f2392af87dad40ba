use chrono::NaiveDate;
use config::shared::MergeConfig;
use scd::merge::Scd2Merger;
use scd::source::MemoryStagingSource;
use scd::store::{HistorizedStore, MemoryStore};
use scd::test_utils::fixtures::{at, staged};
use telemetry::init_test_tracing;

async fn merged_store() -> MemoryStore {
    let merger = Scd2Merger::new(
        MemoryStore::new(),
        MemoryStagingSource::new(),
        MergeConfig::default(),
    );

    let runs = [
        vec![
            staged("order-1", "processing", "2024-01-01 06:00:00"),
            staged("order-2", "processing", "2024-01-01 06:00:00"),
        ],
        vec![staged("order-1", "shipped", "2024-01-03 06:00:00")],
        vec![
            staged("order-1", "delivered", "2024-01-06 06:00:00"),
            staged("order-3", "processing", "2024-01-06 06:00:00"),
        ],
    ];
    for run in runs {
        merger.merge_records(&run).await.unwrap();
    }

    merger.store().clone()
}

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn versions_valid_at_returns_point_in_time_snapshot() {
    init_test_tracing();
    let store = merged_store().await;

    let snapshot = store
        .versions_valid_at(at("2024-01-04 12:00:00"))
        .await
        .unwrap();
    let statuses: Vec<_> = snapshot
        .iter()
        .map(|v| (v.natural_key.as_str(), v.tracked.status.as_deref().unwrap()))
        .collect();
    assert_eq!(
        statuses,
        [("order-1", "shipped"), ("order-2", "processing")]
    );

    // Windows are closed at the start and open at the end.
    let at_boundary = store
        .versions_valid_at(at("2024-01-03 06:00:00"))
        .await
        .unwrap();
    let order_1 = at_boundary
        .iter()
        .find(|v| v.natural_key == "order-1")
        .unwrap();
    assert_eq!(order_1.tracked.status.as_deref(), Some("shipped"));

    let before_any = store
        .versions_valid_at(at("2023-12-31 23:59:59"))
        .await
        .unwrap();
    assert!(before_any.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn current_snapshot_lists_one_version_per_order() {
    init_test_tracing();
    let store = merged_store().await;

    let current = store.current_snapshot().await.unwrap();

    let keys: Vec<_> = current.iter().map(|v| v.natural_key.as_str()).collect();
    assert_eq!(keys, ["order-1", "order-2", "order-3"]);
    assert!(current.iter().all(|v| v.is_current));
    assert_eq!(store.count_versions().await.unwrap(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn versions_starting_between_reads_date_partitions() {
    init_test_tracing();
    let store = merged_store().await;

    let first_days = store
        .versions_starting_between(date("2024-01-01"), date("2024-01-03"))
        .await
        .unwrap();
    let keys: Vec<_> = first_days.iter().map(|v| v.surrogate_key).collect();
    assert_eq!(keys, [1, 2, 3]);

    let last_day = store
        .versions_starting_between(date("2024-01-06"), date("2024-01-06"))
        .await
        .unwrap();
    assert_eq!(last_day.len(), 2);

    let inverted = store
        .versions_starting_between(date("2024-01-06"), date("2024-01-01"))
        .await
        .unwrap();
    assert!(inverted.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn history_of_unknown_order_is_empty() {
    init_test_tracing();
    let store = merged_store().await;

    assert!(store.history("order-404").await.unwrap().is_empty());
    assert!(store.current_version("order-404").await.unwrap().is_none());
}
