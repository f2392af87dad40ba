use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};

/// Fires after the versions to close have been closed and before new versions are inserted.
pub const APPLY_PLAN__BETWEEN_CLOSE_AND_INSERT: &str = "apply_plan.between_close_and_insert";

/// Fires after the plan has been built, before it reaches the store.
pub const MERGE_RUN__BEFORE_APPLY: &str = "merge_run.before_apply";

pub fn scd_fail_point(name: &str) -> ScdResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::WithNoRetry,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
