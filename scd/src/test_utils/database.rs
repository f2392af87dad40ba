use config::shared::{MergeConfig, PgConnectionConfig, StagingConfig, TlsConfig};
use postgres::test_utils::{create_pg_database, drop_pg_database};
use sqlx::PgPool;
use uuid::Uuid;

use crate::source::PostgresStagingSource;
use crate::staging::RawStagedRecord;
use crate::store::PostgresStore;

/// Builds a connection config for a uniquely named database on the local test server.
///
/// Reads `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and the
/// optional `TESTS_DATABASE_PASSWORD`. Returns `None` when no test server is configured.
///
/// # Panics
/// Panics if `TESTS_DATABASE_HOST` is set but the remaining variables are missing or invalid.
pub fn local_pg_connection_config() -> Option<PgConnectionConfig> {
    let host = std::env::var("TESTS_DATABASE_HOST").ok()?;

    Some(PgConnectionConfig {
        host,
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig::disabled(),
    })
}

/// A freshly created database with the historized store and staging migrations applied.
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    pub fn store(&self) -> PostgresStore {
        PostgresStore::from_pool(self.pool.clone(), MergeConfig::DEFAULT_ADVISORY_LOCK_KEY)
    }

    pub fn staging_source(&self, clear_after_merge: bool) -> PostgresStagingSource {
        PostgresStagingSource::from_pool(
            self.pool.clone(),
            StagingConfig {
                clear_after_merge,
                ..Default::default()
            },
        )
    }

    /// Appends records to the default staging table.
    pub async fn stage(&self, records: &[RawStagedRecord]) {
        for record in records {
            sqlx::query(
                r#"
                insert into staging.orders (
                    order_id, customer_id, order_status, order_purchase_timestamp,
                    order_approved_at, order_delivered_carrier_date,
                    order_delivered_customer_date, order_estimated_delivery_date, load_timestamp
                )
                values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&record.order_id)
            .bind(&record.customer_id)
            .bind(&record.order_status)
            .bind(&record.order_purchase_timestamp)
            .bind(&record.order_approved_at)
            .bind(&record.order_delivered_carrier_date)
            .bind(&record.order_delivered_customer_date)
            .bind(&record.order_estimated_delivery_date)
            .bind(&record.load_timestamp)
            .execute(&self.pool)
            .await
            .expect("Failed to stage record");
        }
    }

    pub async fn staged_count(&self) -> i64 {
        sqlx::query_scalar("select count(*) from staging.orders")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count staged records")
    }

    /// Closes the pool and drops the database.
    pub async fn drop_database(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}

/// Creates a database for a single test and runs the migrations on it.
///
/// Returns `None` when no test server is configured, so callers can skip.
///
/// # Panics
/// Panics if the database cannot be created or migrated.
pub async fn spawn_test_database() -> Option<TestDatabase> {
    let Some(config) = local_pg_connection_config() else {
        eprintln!("warning: TESTS_DATABASE_HOST is not set, skipping database test");
        return None;
    };

    let pool = create_pg_database(&config).await;
    postgres::migrations::apply_migrations(&config)
        .await
        .expect("Failed to run migrations");

    Some(TestDatabase { config, pool })
}
