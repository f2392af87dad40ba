use std::collections::HashSet;

use crate::error::{ErrorKind, ScdError, ScdResult};
use crate::scd_error;
use crate::types::{OrderVersion, VALID_TO_SENTINEL};

/// Checks the history of a single natural key.
///
/// `history` must be ordered by `valid_from`. A non-empty history has exactly one current
/// version, which is the last one and runs to the sentinel; every other version ends where
/// its successor starts.
pub fn verify_history(natural_key: &str, history: &[OrderVersion]) -> ScdResult<()> {
    let mut errors = Vec::new();

    if history.is_empty() {
        return Ok(());
    }

    let current = history.iter().filter(|v| v.is_current).count();
    if current != 1 {
        errors.push(scd_error!(
            ErrorKind::InvariantViolation,
            "Natural key does not have exactly one current version",
            format!("natural_key: {natural_key}, current versions: {current}")
        ));
    }

    for version in history {
        if version.natural_key != natural_key {
            errors.push(scd_error!(
                ErrorKind::InvariantViolation,
                "History holds a version of another natural key",
                format!(
                    "natural_key: {natural_key}, surrogate_key: {}",
                    version.surrogate_key
                )
            ));
        }
        if version.valid_from >= version.valid_to {
            errors.push(scd_error!(
                ErrorKind::InvariantViolation,
                "Version has an empty validity window",
                format!(
                    "natural_key: {natural_key}, surrogate_key: {}, valid_from: {}, valid_to: {}",
                    version.surrogate_key, version.valid_from, version.valid_to
                )
            ));
        }
    }

    for pair in history.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        if earlier.is_current {
            errors.push(scd_error!(
                ErrorKind::InvariantViolation,
                "Current version is not the latest version",
                format!(
                    "natural_key: {natural_key}, surrogate_key: {}",
                    earlier.surrogate_key
                )
            ));
        }
        if earlier.valid_to != later.valid_from {
            errors.push(scd_error!(
                ErrorKind::InvariantViolation,
                "Consecutive versions are not contiguous",
                format!(
                    "natural_key: {natural_key}, surrogate_keys: {} -> {}, gap: {} -> {}",
                    earlier.surrogate_key,
                    later.surrogate_key,
                    earlier.valid_to,
                    later.valid_from
                )
            ));
        }
    }

    if let Some(last) = history.last()
        && last.is_current
        && last.valid_to != *VALID_TO_SENTINEL
    {
        errors.push(scd_error!(
            ErrorKind::InvariantViolation,
            "Current version does not run to the sentinel",
            format!(
                "natural_key: {natural_key}, surrogate_key: {}, valid_to: {}",
                last.surrogate_key, last.valid_to
            )
        ));
    }

    into_result(errors)
}

/// Checks that no surrogate key appears twice across `versions`.
pub fn verify_unique_surrogate_keys<'a>(
    versions: impl IntoIterator<Item = &'a OrderVersion>,
) -> ScdResult<()> {
    let mut seen = HashSet::new();
    let errors: Vec<ScdError> = versions
        .into_iter()
        .filter(|version| !seen.insert(version.surrogate_key))
        .map(|version| {
            scd_error!(
                ErrorKind::InvariantViolation,
                "Surrogate key is used by more than one version",
                format!("surrogate_key: {}", version.surrogate_key)
            )
        })
        .collect();

    into_result(errors)
}

fn into_result(errors: Vec<ScdError>) -> ScdResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}
