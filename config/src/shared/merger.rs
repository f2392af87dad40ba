use serde::Deserialize;

use crate::Config;
use crate::shared::{MergeConfig, PgConnectionConfig, StagingConfig, ValidationError};

/// Top-level configuration of the `merger` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MergerConfig {
    /// Database holding both the staging table and the historized table.
    pub postgres: PgConnectionConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    /// Prometheus exporter; disabled when absent.
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl MergerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.postgres.validate()?;
        self.staging.validate()?;

        if let Some(metrics) = &self.metrics {
            metrics.validate()?;
        }

        Ok(())
    }
}

impl Config for MergerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl MetricsConfig {
    pub const DEFAULT_PORT: u16 = 9000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::MetricsPortZero);
        }

        Ok(())
    }
}

fn default_metrics_port() -> u16 {
    MetricsConfig::DEFAULT_PORT
}
