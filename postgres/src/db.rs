use std::time::Duration;

use config::shared::{IntoConnectOptions, MERGER_STORE_OPTIONS, PgConnectionConfig};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Time after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates a lazily connecting pool for merge runs.
///
/// A merge run issues its queries sequentially, so two connections are enough: one for the
/// run and one spare for the staging source.
pub fn connect_store_pool(config: &PgConnectionConfig) -> PgPool {
    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(2)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(config.with_db(Some(&MERGER_STORE_OPTIONS)))
}
