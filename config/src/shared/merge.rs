use serde::{Deserialize, Serialize};

/// Behaviour of a single merge run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MergeConfig {
    /// Re-reads the history of every touched order after applying the plan and fails the
    /// run if the single-current or continuity invariants are broken.
    #[serde(default = "default_verify_after_apply")]
    pub verify_after_apply: bool,
    /// Builds and logs the merge plan without writing it.
    #[serde(default)]
    pub dry_run: bool,
    /// Key of the transaction-scoped advisory lock serializing writers on Postgres.
    #[serde(default = "default_advisory_lock_key")]
    pub advisory_lock_key: i64,
}

impl MergeConfig {
    pub const DEFAULT_VERIFY_AFTER_APPLY: bool = true;

    /// Arbitrary constant shared by every merger process writing the same store.
    pub const DEFAULT_ADVISORY_LOCK_KEY: i64 = 0x5CD2_0001;
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            verify_after_apply: default_verify_after_apply(),
            dry_run: false,
            advisory_lock_key: default_advisory_lock_key(),
        }
    }
}

fn default_verify_after_apply() -> bool {
    MergeConfig::DEFAULT_VERIFY_AFTER_APPLY
}

fn default_advisory_lock_key() -> i64 {
    MergeConfig::DEFAULT_ADVISORY_LOCK_KEY
}
