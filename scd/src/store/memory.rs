use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::failpoints::{APPLY_PLAN__BETWEEN_CLOSE_AND_INSERT, scd_fail_point};
use crate::merge::{MergePlan, VersionClose};
use crate::store::base::{AppliedPlan, HistorizedStore};
use crate::types::{OrderVersion, SurrogateKey};

/// Inner state of [`MemoryStore`].
#[derive(Debug, Clone, Default)]
struct Inner {
    /// Every version, keyed by surrogate key.
    versions: BTreeMap<SurrogateKey, OrderVersion>,
    /// Surrogate keys of each natural key ordered by `valid_from`.
    by_natural_key: BTreeMap<String, Vec<SurrogateKey>>,
    /// Surrogate keys grouped by the date of `valid_from`.
    partitions: BTreeMap<NaiveDate, BTreeSet<SurrogateKey>>,
    /// Highest surrogate key ever stored.
    max_surrogate_key: Option<SurrogateKey>,
}

impl Inner {
    fn current_version(&self, natural_key: &str) -> Option<&OrderVersion> {
        self.by_natural_key
            .get(natural_key)
            .and_then(|keys| keys.last())
            .and_then(|key| self.versions.get(key))
            .filter(|version| version.is_current)
    }

    fn resolve<'a>(&'a self, keys: impl IntoIterator<Item = &'a SurrogateKey>) -> Vec<OrderVersion> {
        keys.into_iter()
            .filter_map(|key| self.versions.get(key))
            .cloned()
            .collect()
    }

    /// Rejects plans built against a different state than the current one.
    fn check_plan(&self, plan: &MergePlan) -> ScdResult<()> {
        if plan.base_max_surrogate_key != self.max_surrogate_key {
            bail!(
                ErrorKind::WriteConflict,
                "Historized table changed since the merge plan was built",
                format!(
                    "plan base max surrogate key: {:?}, store max surrogate key: {:?}",
                    plan.base_max_surrogate_key, self.max_surrogate_key
                )
            );
        }

        for close in &plan.closes {
            let still_current = self
                .current_version(&close.natural_key)
                .is_some_and(|version| version.surrogate_key == close.surrogate_key);
            if !still_current {
                bail!(
                    ErrorKind::WriteConflict,
                    "Version to close is no longer current",
                    format!(
                        "natural_key: {}, surrogate_key: {}",
                        close.natural_key, close.surrogate_key
                    )
                );
            }
        }

        let closing: BTreeSet<&str> = plan
            .closes
            .iter()
            .map(|close| close.natural_key.as_str())
            .collect();
        for version in &plan.inserts {
            let Some(current) = self.current_version(&version.natural_key) else {
                continue;
            };

            if !closing.contains(version.natural_key.as_str()) {
                bail!(
                    ErrorKind::WriteConflict,
                    "Natural key gained a current version since the merge plan was built",
                    format!(
                        "natural_key: {}, current surrogate_key: {}",
                        version.natural_key, current.surrogate_key
                    )
                );
            }

            if version.valid_from <= current.valid_from {
                bail!(
                    ErrorKind::InvalidState,
                    "Merge plan inserts a version that does not supersede the current one",
                    format!(
                        "natural_key: {}, current valid_from: {}, new valid_from: {}",
                        version.natural_key, current.valid_from, version.valid_from
                    )
                );
            }
        }

        Ok(())
    }

    fn close_version(&mut self, close: &VersionClose) -> ScdResult<()> {
        let Some(version) = self.versions.get_mut(&close.surrogate_key) else {
            bail!(
                ErrorKind::InvalidState,
                "Version to close does not exist",
                format!("surrogate_key: {}", close.surrogate_key)
            );
        };

        version.valid_to = close.valid_to;
        version.is_current = false;
        version.content_fingerprint = close.content_fingerprint.clone();

        Ok(())
    }

    fn insert_version(&mut self, version: OrderVersion) {
        let key = version.surrogate_key;

        self.by_natural_key
            .entry(version.natural_key.clone())
            .or_default()
            .push(key);
        self.partitions
            .entry(version.partition_date())
            .or_default()
            .insert(key);
        self.max_surrogate_key = Some(self.max_surrogate_key.map_or(key, |max| max.max(key)));
        self.versions.insert(key, version);
    }
}

/// In-memory historized store.
///
/// Meant for tests and for embedding the merge engine without a database. A plan is applied
/// to a copy of the state which replaces the live state only once every write succeeded, so
/// readers never see a half-applied plan.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored version ordered by surrogate key.
    pub async fn all_versions(&self) -> Vec<OrderVersion> {
        let inner = self.inner.lock().await;

        inner.versions.values().cloned().collect()
    }
}

impl HistorizedStore for MemoryStore {
    async fn current_version(&self, natural_key: &str) -> ScdResult<Option<OrderVersion>> {
        let inner = self.inner.lock().await;

        Ok(inner.current_version(natural_key).cloned())
    }

    async fn current_versions(
        &self,
        natural_keys: &[String],
    ) -> ScdResult<HashMap<String, OrderVersion>> {
        let inner = self.inner.lock().await;

        Ok(natural_keys
            .iter()
            .filter_map(|key| inner.current_version(key))
            .map(|version| (version.natural_key.clone(), version.clone()))
            .collect())
    }

    async fn current_snapshot(&self) -> ScdResult<Vec<OrderVersion>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .by_natural_key
            .keys()
            .filter_map(|key| inner.current_version(key))
            .cloned()
            .collect())
    }

    async fn max_surrogate_key(&self) -> ScdResult<Option<SurrogateKey>> {
        let inner = self.inner.lock().await;

        Ok(inner.max_surrogate_key)
    }

    async fn apply_merge_plan(&self, plan: &MergePlan) -> ScdResult<AppliedPlan> {
        plan.check_well_formed()?;

        let mut inner = self.inner.lock().await;

        inner.check_plan(plan)?;

        let mut staged = inner.clone();
        for close in &plan.closes {
            staged.close_version(close)?;
        }

        scd_fail_point(APPLY_PLAN__BETWEEN_CLOSE_AND_INSERT)?;

        for version in &plan.inserts {
            staged.insert_version(version.clone());
        }

        *inner = staged;

        Ok(AppliedPlan {
            closed: plan.closes.len(),
            inserted: plan.inserts.len(),
        })
    }

    async fn history(&self, natural_key: &str) -> ScdResult<Vec<OrderVersion>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .by_natural_key
            .get(natural_key)
            .map(|keys| inner.resolve(keys))
            .unwrap_or_default())
    }

    async fn versions_valid_at(&self, instant: NaiveDateTime) -> ScdResult<Vec<OrderVersion>> {
        let inner = self.inner.lock().await;

        // Versions starting after the instant's date cannot contain it.
        let mut versions: Vec<OrderVersion> = inner
            .partitions
            .range(..=instant.date())
            .flat_map(|(_, keys)| keys.iter())
            .filter_map(|key| inner.versions.get(key))
            .filter(|version| version.is_valid_at(instant))
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));

        Ok(versions)
    }

    async fn versions_starting_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ScdResult<Vec<OrderVersion>> {
        if from > to {
            return Ok(Vec::new());
        }

        let inner = self.inner.lock().await;

        let mut versions =
            inner.resolve(inner.partitions.range(from..=to).flat_map(|(_, keys)| keys));
        versions.sort_by_key(|version| (version.valid_from, version.surrogate_key));

        Ok(versions)
    }

    async fn count_versions(&self) -> ScdResult<u64> {
        let inner = self.inner.lock().await;

        Ok(inner.versions.len() as u64)
    }
}
