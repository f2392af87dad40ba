use crate::merge::{verify_history, verify_unique_surrogate_keys};
use crate::store::{HistorizedStore, MemoryStore};

/// Panics unless every natural key in `store` has a valid history and no surrogate key is
/// shared between versions.
pub async fn assert_store_invariants(store: &MemoryStore) {
    let versions = store.all_versions().await;
    verify_unique_surrogate_keys(&versions).unwrap();

    let mut natural_keys: Vec<&str> = versions.iter().map(|v| v.natural_key.as_str()).collect();
    natural_keys.sort_unstable();
    natural_keys.dedup();

    for natural_key in natural_keys {
        let history = store.history(natural_key).await.unwrap();
        if let Err(err) = verify_history(natural_key, &history) {
            panic!("history of {natural_key} is invalid: {err}");
        }
    }

    let current = store.current_snapshot().await.unwrap();
    assert!(current.iter().all(|version| version.is_current));
}
