use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgPool, prelude::FromRow};
use thiserror::Error;

/// A row from the `scd.order_versions` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OrderVersionRow {
    pub surrogate_key: i64,
    pub natural_key: String,
    pub customer_reference: Option<String>,
    pub status: Option<String>,
    pub purchased_at: Option<NaiveDateTime>,
    pub approved_at: Option<NaiveDateTime>,
    pub delivered_carrier_at: Option<NaiveDateTime>,
    pub delivered_customer_at: Option<NaiveDateTime>,
    pub estimated_delivery_at: Option<NaiveDateTime>,
    pub load_timestamp: NaiveDateTime,
    pub content_fingerprint: String,
    pub valid_from: NaiveDateTime,
    pub valid_to: NaiveDateTime,
    pub is_current: bool,
}

/// Columns written when closing a current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCloseRow {
    pub surrogate_key: i64,
    pub valid_to: NaiveDateTime,
    pub content_fingerprint: String,
}

/// Rows touched by [`apply_version_changes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    pub closed: u64,
    pub inserted: u64,
}

#[derive(Debug, Error)]
pub enum ApplyChangesError {
    /// The table no longer matches the state the changes were computed against.
    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

const SELECT_COLUMNS: &str = r#"
    select surrogate_key, natural_key, customer_reference, status,
           purchased_at, approved_at, delivered_carrier_at, delivered_customer_at,
           estimated_delivery_at, load_timestamp, content_fingerprint,
           valid_from, valid_to, is_current
    from scd.order_versions
"#;

/// Fetches the current versions of the given natural keys.
pub async fn get_current_versions(
    pool: &PgPool,
    natural_keys: &[String],
) -> sqlx::Result<Vec<OrderVersionRow>> {
    let query = format!("{SELECT_COLUMNS} where natural_key = any($1) and is_current");

    sqlx::query_as::<_, OrderVersionRow>(&query)
        .bind(natural_keys)
        .fetch_all(pool)
        .await
}

/// Fetches every current version ordered by natural key.
pub async fn get_all_current_versions(pool: &PgPool) -> sqlx::Result<Vec<OrderVersionRow>> {
    let query = format!("{SELECT_COLUMNS} where is_current order by natural_key");

    sqlx::query_as::<_, OrderVersionRow>(&query)
        .fetch_all(pool)
        .await
}

pub async fn get_max_surrogate_key(pool: &PgPool) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar::<_, Option<i64>>("select max(surrogate_key) from scd.order_versions")
        .fetch_one(pool)
        .await
}

/// Fetches all versions of a natural key ordered by `valid_from`.
pub async fn get_history(pool: &PgPool, natural_key: &str) -> sqlx::Result<Vec<OrderVersionRow>> {
    let query = format!("{SELECT_COLUMNS} where natural_key = $1 order by valid_from");

    sqlx::query_as::<_, OrderVersionRow>(&query)
        .bind(natural_key)
        .fetch_all(pool)
        .await
}

/// Fetches the versions whose `[valid_from, valid_to)` window contains `instant`.
pub async fn get_versions_valid_at(
    pool: &PgPool,
    instant: NaiveDateTime,
) -> sqlx::Result<Vec<OrderVersionRow>> {
    let query = format!(
        "{SELECT_COLUMNS} where valid_from_date <= $2 and valid_from <= $1 and $1 < valid_to order by natural_key"
    );

    sqlx::query_as::<_, OrderVersionRow>(&query)
        .bind(instant)
        .bind(instant.date())
        .fetch_all(pool)
        .await
}

/// Fetches the versions whose `valid_from` date lies in `[from, to]`.
pub async fn get_versions_starting_between(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> sqlx::Result<Vec<OrderVersionRow>> {
    let query = format!(
        "{SELECT_COLUMNS} where valid_from_date between $1 and $2 order by valid_from, surrogate_key"
    );

    sqlx::query_as::<_, OrderVersionRow>(&query)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
}

pub async fn count_versions(pool: &PgPool) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("select count(*) from scd.order_versions")
        .fetch_one(pool)
        .await
}

/// Closes and inserts versions in a single transaction.
///
/// Takes the transaction-scoped advisory lock `advisory_lock_key` first, so concurrent
/// writers queue up. The transaction is rolled back with [`ApplyChangesError::Conflict`] if the
/// maximum surrogate key is not `expected_max_surrogate_key`, if a version in `closes` is
/// no longer current or if an insert hits the one-current-version-per-key index.
pub async fn apply_version_changes(
    pool: &PgPool,
    advisory_lock_key: i64,
    expected_max_surrogate_key: Option<i64>,
    closes: &[VersionCloseRow],
    inserts: &[OrderVersionRow],
) -> Result<AppliedChanges, ApplyChangesError> {
    let mut tx = pool.begin().await?;

    sqlx::query("select pg_advisory_xact_lock($1)")
        .bind(advisory_lock_key)
        .execute(&mut *tx)
        .await?;

    let max_surrogate_key: Option<i64> =
        sqlx::query_scalar("select max(surrogate_key) from scd.order_versions")
            .fetch_one(&mut *tx)
            .await?;

    if max_surrogate_key != expected_max_surrogate_key {
        return Err(ApplyChangesError::Conflict(format!(
            "expected max surrogate key {expected_max_surrogate_key:?}, found {max_surrogate_key:?}"
        )));
    }

    let closed = close_versions(&mut tx, closes).await?;
    if closed != closes.len() as u64 {
        return Err(ApplyChangesError::Conflict(format!(
            "{} of {} versions to close were no longer current",
            closes.len() as u64 - closed,
            closes.len()
        )));
    }

    let inserted = match insert_versions(&mut tx, inserts).await {
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            return Err(ApplyChangesError::Conflict(format!(
                "inserted version collides with a stored one: {}",
                err.message()
            )));
        }
        result => result?,
    };

    tx.commit().await?;

    Ok(AppliedChanges { closed, inserted })
}

async fn close_versions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    closes: &[VersionCloseRow],
) -> sqlx::Result<u64> {
    if closes.is_empty() {
        return Ok(0);
    }

    let surrogate_keys: Vec<i64> = closes.iter().map(|c| c.surrogate_key).collect();
    let valid_tos: Vec<NaiveDateTime> = closes.iter().map(|c| c.valid_to).collect();
    let fingerprints: Vec<&str> = closes.iter().map(|c| c.content_fingerprint.as_str()).collect();

    let result = sqlx::query(
        r#"
        update scd.order_versions v
        set valid_to = c.valid_to,
            is_current = false,
            content_fingerprint = c.content_fingerprint
        from unnest($1::int8[], $2::timestamp[], $3::text[])
            as c(surrogate_key, valid_to, content_fingerprint)
        where v.surrogate_key = c.surrogate_key and v.is_current
        "#,
    )
    .bind(&surrogate_keys)
    .bind(&valid_tos)
    .bind(&fingerprints)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_versions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    rows: &[OrderVersionRow],
) -> sqlx::Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    fn column<T>(rows: &[OrderVersionRow], f: impl Fn(&OrderVersionRow) -> T) -> Vec<T> {
        rows.iter().map(f).collect()
    }

    let result = sqlx::query(
        r#"
        insert into scd.order_versions (
            surrogate_key, natural_key, customer_reference, status,
            purchased_at, approved_at, delivered_carrier_at, delivered_customer_at,
            estimated_delivery_at, load_timestamp, content_fingerprint,
            valid_from, valid_to, is_current
        )
        select * from unnest(
            $1::int8[], $2::text[], $3::text[], $4::text[],
            $5::timestamp[], $6::timestamp[], $7::timestamp[], $8::timestamp[],
            $9::timestamp[], $10::timestamp[], $11::text[],
            $12::timestamp[], $13::timestamp[], $14::bool[]
        )
        "#,
    )
    .bind(column(rows, |r| r.surrogate_key))
    .bind(column(rows, |r| r.natural_key.clone()))
    .bind(column(rows, |r| r.customer_reference.clone()))
    .bind(column(rows, |r| r.status.clone()))
    .bind(column(rows, |r| r.purchased_at))
    .bind(column(rows, |r| r.approved_at))
    .bind(column(rows, |r| r.delivered_carrier_at))
    .bind(column(rows, |r| r.delivered_customer_at))
    .bind(column(rows, |r| r.estimated_delivery_at))
    .bind(column(rows, |r| r.load_timestamp))
    .bind(column(rows, |r| r.content_fingerprint.clone()))
    .bind(column(rows, |r| r.valid_from))
    .bind(column(rows, |r| r.valid_to))
    .bind(column(rows, |r| r.is_current))
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}
