use config::shared::{IntoConnectOptions, MERGER_MIGRATION_OPTIONS, PgConnectionConfig};
use sqlx::{Executor, postgres::PgPoolOptions};
use tracing::info;

/// Creates or upgrades the `scd` and `staging` schemas.
///
/// The `_sqlx_migrations` bookkeeping table is kept inside the `scd` schema.
pub async fn apply_migrations(connection_config: &PgConnectionConfig) -> Result<(), sqlx::Error> {
    let options = connection_config.with_db(Some(&MERGER_MIGRATION_OPTIONS));

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists scd;").await?;
                conn.execute("set search_path = 'scd';").await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    info!("applying historized store migrations");

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;

    info!("historized store migrations applied");

    Ok(())
}
