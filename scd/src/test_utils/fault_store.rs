use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::merge::MergePlan;
use crate::store::{AppliedPlan, HistorizedStore};
use crate::types::{OrderVersion, SurrogateKey};

/// Failure injected by [`FaultInjectingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// Returns an error as if the store were unreachable.
    Error,
    Panic,
}

/// Operations of [`FaultInjectingStore`] that fail, and how.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultConfig {
    pub current_versions: Option<FaultType>,
    pub max_surrogate_key: Option<FaultType>,
    pub apply_merge_plan: Option<FaultType>,
}

/// Wraps a [`HistorizedStore`] and fails the configured operations before they reach it.
#[derive(Debug, Clone)]
pub struct FaultInjectingStore<S> {
    inner: S,
    config: FaultConfig,
}

impl<S> FaultInjectingStore<S> {
    pub fn wrap(inner: S, config: FaultConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn trigger(fault: Option<FaultType>, operation: &str) -> ScdResult<()> {
    match fault {
        None => Ok(()),
        Some(FaultType::Error) => bail!(
            ErrorKind::StoreConnectionFailed,
            "Injected store failure",
            format!("operation: {operation}")
        ),
        Some(FaultType::Panic) => panic!("injected panic in {operation}"),
    }
}

impl<S> HistorizedStore for FaultInjectingStore<S>
where
    S: HistorizedStore + Sync,
{
    async fn current_version(&self, natural_key: &str) -> ScdResult<Option<OrderVersion>> {
        trigger(self.config.current_versions, "current_version")?;
        self.inner.current_version(natural_key).await
    }

    async fn current_versions(
        &self,
        natural_keys: &[String],
    ) -> ScdResult<HashMap<String, OrderVersion>> {
        trigger(self.config.current_versions, "current_versions")?;
        self.inner.current_versions(natural_keys).await
    }

    async fn current_snapshot(&self) -> ScdResult<Vec<OrderVersion>> {
        self.inner.current_snapshot().await
    }

    async fn max_surrogate_key(&self) -> ScdResult<Option<SurrogateKey>> {
        trigger(self.config.max_surrogate_key, "max_surrogate_key")?;
        self.inner.max_surrogate_key().await
    }

    async fn apply_merge_plan(&self, plan: &MergePlan) -> ScdResult<AppliedPlan> {
        trigger(self.config.apply_merge_plan, "apply_merge_plan")?;
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
