//! Configuration types shared by the merge engine and the merger binary.

mod base;
mod connection;
mod merge;
mod merger;
mod staging;

pub use base::ValidationError;
pub use connection::{
    IntoConnectOptions, MERGER_MIGRATION_OPTIONS, MERGER_STORE_OPTIONS, PgConnectionConfig,
    PgConnectionOptions, TlsConfig,
};
pub use merge::MergeConfig;
pub use merger::{MergerConfig, MetricsConfig};
pub use staging::StagingConfig;
