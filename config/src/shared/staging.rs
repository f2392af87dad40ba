use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Location of the staging table filled by the external ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StagingConfig {
    #[serde(default = "default_staging_schema")]
    pub schema: String,
    #[serde(default = "default_staging_table")]
    pub table: String,
    /// Deletes the consumed staging rows once the merge run has committed.
    ///
    /// Safe to enable because replaying an unchanged batch is a no-op: if the delete
    /// fails, the next run merges the same rows again without effect.
    #[serde(default)]
    pub clear_after_merge: bool,
}

impl StagingConfig {
    pub const DEFAULT_SCHEMA: &'static str = "staging";

    pub const DEFAULT_TABLE: &'static str = "orders";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema.trim().is_empty() {
            return Err(ValidationError::EmptyField("staging.schema"));
        }
        if self.table.trim().is_empty() {
            return Err(ValidationError::EmptyField("staging.table"));
        }

        Ok(())
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            schema: default_staging_schema(),
            table: default_staging_table(),
            clear_after_merge: false,
        }
    }
}

fn default_staging_schema() -> String {
    StagingConfig::DEFAULT_SCHEMA.to_string()
}

fn default_staging_table() -> String {
    StagingConfig::DEFAULT_TABLE.to_string()
}
