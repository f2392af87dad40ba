use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use config::shared::{MergeConfig, PgConnectionConfig};
use postgres::orders::{self, OrderVersionRow, VersionCloseRow};
use sqlx::PgPool;
use tracing::debug;

use crate::error::{ErrorKind, ScdError, ScdResult};
use crate::merge::{MergePlan, VersionClose};
use crate::scd_error;
use crate::store::base::{AppliedPlan, HistorizedStore};
use crate::types::{Fingerprint, OrderVersion, SurrogateKey, TrackedAttributes};

impl TryFrom<OrderVersionRow> for OrderVersion {
    type Error = ScdError;

    fn try_from(row: OrderVersionRow) -> Result<Self, Self::Error> {
        Ok(OrderVersion {
            surrogate_key: row.surrogate_key,
            natural_key: row.natural_key,
            customer_reference: row.customer_reference,
            tracked: TrackedAttributes {
                status: row.status,
                purchased_at: row.purchased_at,
                approved_at: row.approved_at,
                delivered_carrier_at: row.delivered_carrier_at,
                delivered_customer_at: row.delivered_customer_at,
                estimated_delivery_at: row.estimated_delivery_at,
            },
            load_timestamp: row.load_timestamp,
            content_fingerprint: Fingerprint::from_hex(row.content_fingerprint)?,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            is_current: row.is_current,
        })
    }
}

impl From<&OrderVersion> for OrderVersionRow {
    fn from(version: &OrderVersion) -> Self {
        OrderVersionRow {
            surrogate_key: version.surrogate_key,
            natural_key: version.natural_key.clone(),
            customer_reference: version.customer_reference.clone(),
            status: version.tracked.status.clone(),
            purchased_at: version.tracked.purchased_at,
            approved_at: version.tracked.approved_at,
            delivered_carrier_at: version.tracked.delivered_carrier_at,
            delivered_customer_at: version.tracked.delivered_customer_at,
            estimated_delivery_at: version.tracked.estimated_delivery_at,
            load_timestamp: version.load_timestamp,
            content_fingerprint: version.content_fingerprint.as_str().to_owned(),
            valid_from: version.valid_from,
            valid_to: version.valid_to,
            is_current: version.is_current,
        }
    }
}

impl From<&VersionClose> for VersionCloseRow {
    fn from(close: &VersionClose) -> Self {
        VersionCloseRow {
            surrogate_key: close.surrogate_key,
            valid_to: close.valid_to,
            content_fingerprint: close.content_fingerprint.as_str().to_owned(),
        }
    }
}

fn into_versions(rows: Vec<OrderVersionRow>) -> ScdResult<Vec<OrderVersion>> {
    rows.into_iter().map(OrderVersion::try_from).collect()
}

/// Historized store backed by the `scd.order_versions` table.
///
/// Plans are applied in one transaction serialized by a transaction-scoped advisory lock, so
/// concurrent merger processes never interleave their writes.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    advisory_lock_key: i64,
}

impl PostgresStore {
    /// Creates a store with a lazily connecting pool.
    pub fn new(connection_config: &PgConnectionConfig, merge_config: &MergeConfig) -> Self {
        Self::from_pool(
            postgres::db::connect_store_pool(connection_config),
            merge_config.advisory_lock_key,
        )
    }

    pub fn from_pool(pool: PgPool, advisory_lock_key: i64) -> Self {
        Self {
            pool,
            advisory_lock_key,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl HistorizedStore for PostgresStore {
    async fn current_version(&self, natural_key: &str) -> ScdResult<Option<OrderVersion>> {
        let rows = orders::get_current_versions(&self.pool, &[natural_key.to_owned()]).await?;

        rows.into_iter().next().map(OrderVersion::try_from).transpose()
    }

    async fn current_versions(
        &self,
        natural_keys: &[String],
    ) -> ScdResult<HashMap<String, OrderVersion>> {
        if natural_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = orders::get_current_versions(&self.pool, natural_keys).await?;

        let versions = into_versions(rows)?
            .into_iter()
            .map(|version| (version.natural_key.clone(), version))
            .collect::<HashMap<_, _>>();

        debug!(
            requested = natural_keys.len(),
            found = versions.len(),
            "loaded current versions"
        );

        Ok(versions)
    }

    async fn current_snapshot(&self) -> ScdResult<Vec<OrderVersion>> {
        into_versions(orders::get_all_current_versions(&self.pool).await?)
    }

    async fn max_surrogate_key(&self) -> ScdResult<Option<SurrogateKey>> {
        Ok(orders::get_max_surrogate_key(&self.pool).await?)
    }

    async fn apply_merge_plan(&self, plan: &MergePlan) -> ScdResult<AppliedPlan> {
        plan.check_well_formed()?;

        let closes: Vec<VersionCloseRow> = plan.closes.iter().map(Into::into).collect();
        let inserts: Vec<OrderVersionRow> = plan.inserts.iter().map(Into::into).collect();

        let applied = orders::apply_version_changes(
            &self.pool,
            self.advisory_lock_key,
            plan.base_max_surrogate_key,
            &closes,
            &inserts,
        )
        .await?;

        Ok(AppliedPlan {
            closed: count_to_usize(applied.closed)?,
            inserted: count_to_usize(applied.inserted)?,
        })
    }

    async fn history(&self, natural_key: &str) -> ScdResult<Vec<OrderVersion>> {
        into_versions(orders::get_history(&self.pool, natural_key).await?)
    }

    async fn versions_valid_at(&self, instant: NaiveDateTime) -> ScdResult<Vec<OrderVersion>> {
        into_versions(orders::get_versions_valid_at(&self.pool, instant).await?)
    }

    async fn versions_starting_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ScdResult<Vec<OrderVersion>> {
        into_versions(orders::get_versions_starting_between(&self.pool, from, to).await?)
    }

    async fn count_versions(&self) -> ScdResult<u64> {
        let count = orders::count_versions(&self.pool).await?;

        u64::try_from(count).map_err(|err| {
            scd_error!(
                ErrorKind::ConversionError,
                "Version count is negative",
                count,
                source: err
            )
        })
    }
}

fn count_to_usize(count: u64) -> ScdResult<usize> {
    usize::try_from(count).map_err(|err| {
        scd_error!(
            ErrorKind::ConversionError,
            "Row count does not fit in usize",
            count,
            source: err
        )
    })
}
