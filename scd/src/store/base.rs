use std::collections::HashMap;
use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::ScdResult;
use crate::merge::MergePlan;
use crate::types::{OrderVersion, SurrogateKey};

/// Rows written by a successfully applied [`MergePlan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedPlan {
    pub closed: usize,
    pub inserted: usize,
}

/// Storage holding every version of every order.
///
/// Versions are only ever appended; an existing version may only have its `valid_to`,
/// `is_current` and `content_fingerprint` changed, and only when it is closed.
///
/// Implementations must serialize calls to [`HistorizedStore::apply_merge_plan`] and must
/// never expose a state where a natural key has zero or two current versions.
pub trait HistorizedStore {
    /// Returns the current version of `natural_key`, if the key is known.
    fn current_version(
        &self,
        natural_key: &str,
    ) -> impl Future<Output = ScdResult<Option<OrderVersion>>> + Send;

    /// Returns the current versions of the given natural keys, keyed by natural key.
    ///
    /// Unknown keys are absent from the result.
    fn current_versions(
        &self,
        natural_keys: &[String],
    ) -> impl Future<Output = ScdResult<HashMap<String, OrderVersion>>> + Send;

    /// Returns every current version, ordered by natural key.
    fn current_snapshot(&self) -> impl Future<Output = ScdResult<Vec<OrderVersion>>> + Send;

    /// Returns the highest surrogate key ever assigned, or `None` for an empty store.
    fn max_surrogate_key(&self) -> impl Future<Output = ScdResult<Option<SurrogateKey>>> + Send;

    /// Applies all closes and inserts of `plan` atomically.
    ///
    /// Fails with [`crate::error::ErrorKind::WriteConflict`] and writes nothing if the
    /// store's maximum surrogate key differs from the plan's base or a version to close is no
    /// longer current.
    fn apply_merge_plan(
        &self,
        plan: &MergePlan,
    ) -> impl Future<Output = ScdResult<AppliedPlan>> + Send;

    /// Returns all versions of `natural_key` ordered by `valid_from`.
    fn history(
        &self,
        natural_key: &str,
    ) -> impl Future<Output = ScdResult<Vec<OrderVersion>>> + Send;

    /// Returns the versions whose validity window contains `instant`, ordered by natural key.
    fn versions_valid_at(
        &self,
        instant: NaiveDateTime,
    ) -> impl Future<Output = ScdResult<Vec<OrderVersion>>> + Send;

    /// Returns the versions whose `valid_from` date lies in `[from, to]`, ordered by
    /// `valid_from` and then surrogate key.
    fn versions_starting_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Future<Output = ScdResult<Vec<OrderVersion>>> + Send;

    /// Returns the total number of stored versions.
    fn count_versions(&self) -> impl Future<Output = ScdResult<u64>> + Send;
}
