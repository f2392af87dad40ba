//! Metric names emitted by merge runs.

/// Label for the per-record outcome of a merge run.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the final status of a merge run.
pub const STATUS_LABEL: &str = "status";

/// Label for the error kind of a failed merge run.
pub const ERROR_KIND_LABEL: &str = "error_kind";

/// Counter of staged records by outcome: `inserted`, `changed`, `unchanged`, `stale`,
/// `rejected`, `collapsed`.
pub const SCD_MERGE_RECORDS_TOTAL: &str = "scd_merge_records_total";

/// Counter of merge runs by status: `applied`, `dry_run`, `failed`.
pub const SCD_MERGE_RUNS_TOTAL: &str = "scd_merge_runs_total";

/// Histogram of merge run durations in seconds.
pub const SCD_MERGE_DURATION_SECONDS: &str = "scd_merge_duration_seconds";

/// Gauge of the highest surrogate key after the last applied run.
pub const SCD_MAX_SURROGATE_KEY: &str = "scd_max_surrogate_key";
