use anyhow::Context;
use config::shared::MergerConfig;
use postgres::migrations::apply_migrations;
use scd::merge::{MergeSummary, Scd2Merger};
use scd::source::PostgresStagingSource;
use scd::store::PostgresStore;
use tracing::info;

/// Migrates the historized store and merges the currently staged batch into it.
pub async fn start_merger(merger_config: MergerConfig) -> anyhow::Result<MergeSummary> {
    info!(
        host = %merger_config.postgres.host,
        database = %merger_config.postgres.name,
        staging_table = %format!("{}.{}", merger_config.staging.schema, merger_config.staging.table),
        dry_run = merger_config.merge.dry_run,
        "starting order history merger"
    );

    apply_migrations(&merger_config.postgres)
        .await
        .context("failed to apply historized store migrations")?;

    let store = PostgresStore::new(&merger_config.postgres, &merger_config.merge);
    // The staging source shares the store's pool.
    let source = PostgresStagingSource::from_pool(store.pool().clone(), merger_config.staging);

    let merger = Scd2Merger::new(store, source, merger_config.merge);
    let summary = merger.run().await?;

    Ok(summary)
}
