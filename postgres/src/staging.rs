use pg_escape::quote_identifier;
use sqlx::{PgPool, prelude::FromRow};

/// A row of the staging table, with its physical row id.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StagedOrderRow {
    /// `ctid` rendered as text; only stable until the row is updated or the table rewritten.
    pub row_id: String,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub order_status: Option<String>,
    pub order_purchase_timestamp: Option<String>,
    pub order_approved_at: Option<String>,
    pub order_delivered_carrier_date: Option<String>,
    pub order_delivered_customer_date: Option<String>,
    pub order_estimated_delivery_date: Option<String>,
    pub load_timestamp: Option<String>,
}

fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// Reads every staged row in physical order.
///
/// Columns are cast to text so the ingestion job may choose narrower types.
pub async fn get_staged_orders(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> sqlx::Result<Vec<StagedOrderRow>> {
    let query = format!(
        r#"
        select ctid::text as row_id,
               order_id::text, customer_id::text, order_status::text,
               order_purchase_timestamp::text, order_approved_at::text,
               order_delivered_carrier_date::text, order_delivered_customer_date::text,
               order_estimated_delivery_date::text, load_timestamp::text
        from {}
        order by ctid
        "#,
        qualified_table(schema, table)
    );

    sqlx::query_as::<_, StagedOrderRow>(&query)
        .fetch_all(pool)
        .await
}

/// Identifies a staged row read by [`get_staged_orders`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRowKey {
    pub row_id: String,
    pub order_id: Option<String>,
    pub load_timestamp: Option<String>,
}

/// Deletes previously read staged rows and returns the number of deleted rows.
///
/// A row is deleted only if it still sits at the same `ctid` and still carries the same
/// `order_id` and `load_timestamp`. The ingestion job is expected to only append to the
/// staging table; a row that was updated or moved by a table rewrite is left in place and
/// picked up again by the next run.
pub async fn delete_staged_orders(
    pool: &PgPool,
    schema: &str,
    table: &str,
    rows: &[StagedRowKey],
) -> sqlx::Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let row_ids: Vec<&str> = rows.iter().map(|row| row.row_id.as_str()).collect();
    let order_ids: Vec<Option<&str>> = rows.iter().map(|row| row.order_id.as_deref()).collect();
    let load_timestamps: Vec<Option<&str>> = rows
        .iter()
        .map(|row| row.load_timestamp.as_deref())
        .collect();

    let query = format!(
        r#"
        delete from {} s
        using unnest($1::text[], $2::text[], $3::text[]) as d(row_id, order_id, load_timestamp)
        where s.ctid = d.row_id::tid
          and s.order_id::text is not distinct from d.order_id
          and s.load_timestamp::text is not distinct from d.load_timestamp
        "#,
        qualified_table(schema, table)
    );

    let result = sqlx::query(&query)
        .bind(&row_ids)
        .bind(&order_ids)
        .bind(&load_timestamps)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
