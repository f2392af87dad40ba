use config::shared::{PgConnectionConfig, StagingConfig};
use postgres::staging::{self, StagedOrderRow, StagedRowKey};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, ScdResult};
use crate::scd_error;
use crate::source::base::{StagedBatch, StagingSource};
use crate::staging::RawStagedRecord;

impl From<StagedOrderRow> for RawStagedRecord {
    fn from(row: StagedOrderRow) -> Self {
        RawStagedRecord {
            order_id: row.order_id,
            customer_id: row.customer_id,
            order_status: row.order_status,
            order_purchase_timestamp: row.order_purchase_timestamp,
            order_approved_at: row.order_approved_at,
            order_delivered_carrier_date: row.order_delivered_carrier_date,
            order_delivered_customer_date: row.order_delivered_customer_date,
            order_estimated_delivery_date: row.order_estimated_delivery_date,
            load_timestamp: row.load_timestamp,
        }
    }
}

/// Staging source reading the staging table filled by the ingestion job.
#[derive(Debug, Clone)]
pub struct PostgresStagingSource {
    pool: PgPool,
    config: StagingConfig,
}

impl PostgresStagingSource {
    pub fn new(connection_config: &PgConnectionConfig, config: StagingConfig) -> Self {
        Self::from_pool(postgres::db::connect_store_pool(connection_config), config)
    }

    pub fn from_pool(pool: PgPool, config: StagingConfig) -> Self {
        Self { pool, config }
    }
}

impl StagingSource for PostgresStagingSource {
    async fn fetch_batch(&self) -> ScdResult<StagedBatch> {
        let rows = staging::get_staged_orders(&self.pool, &self.config.schema, &self.config.table)
            .await
            .map_err(|err| {
                scd_error!(
                    ErrorKind::StagingQueryFailed,
                    "Failed to read staged orders",
                    format!("table: {}.{}", self.config.schema, self.config.table),
                    source: err
                )
            })?;

        let mut batch = StagedBatch {
            records: Vec::with_capacity(rows.len()),
            row_ids: Vec::with_capacity(rows.len()),
        };
        for mut row in rows {
            batch.row_ids.push(std::mem::take(&mut row.row_id));
            batch.records.push(row.into());
        }

        debug!(records = batch.len(), "fetched staged batch");

        Ok(batch)
    }

    async fn complete_batch(&self, batch: &StagedBatch) -> ScdResult<()> {
        if !self.config.clear_after_merge {
            return Ok(());
        }

        let rows: Vec<StagedRowKey> = batch
            .row_ids
            .iter()
            .zip(&batch.records)
            .map(|(row_id, record)| StagedRowKey {
                row_id: row_id.clone(),
                order_id: record.order_id.clone(),
                load_timestamp: record.load_timestamp.clone(),
            })
            .collect();

        let deleted = staging::delete_staged_orders(
            &self.pool,
            &self.config.schema,
            &self.config.table,
            &rows,
        )
        .await
        .map_err(|err| {
            scd_error!(
                ErrorKind::StagingQueryFailed,
                "Failed to clear merged staged orders",
                format!("table: {}.{}", self.config.schema, self.config.table),
                source: err
            )
        })?;

        if deleted < rows.len() as u64 {
            warn!(
                deleted,
                expected = rows.len(),
                "some merged staged orders changed since they were read and were kept"
            );
        }
        info!(deleted, "cleared merged staged orders");

        Ok(())
    }
}
