use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use tracing::warn;

use crate::staging::record::{RawStagedRecord, StagingColumn};
use crate::staging::timestamp::parse_timestamp;
use crate::types::{Candidate, TrackedAttributes};

/// Why a staged record was excluded from a merge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// A field repeats its own column name.
    HeaderRow { column: StagingColumn },
    MissingNaturalKey,
    MissingLoadTime,
    InvalidLoadTime { value: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::HeaderRow { column } => {
                write!(f, "header row (column '{}')", column.name())
            }
            RejectReason::MissingNaturalKey => f.write_str("missing order id"),
            RejectReason::MissingLoadTime => f.write_str("missing load timestamp"),
            RejectReason::InvalidLoadTime { value } => {
                write!(f, "unparseable load timestamp '{value}'")
            }
        }
    }
}

/// A staged record excluded by normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub position: usize,
    pub natural_key: Option<String>,
    pub reason: RejectReason,
}

/// Output of [`normalize_batch`].
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// One candidate per natural key, ordered by natural key.
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<RejectedRecord>,
    /// Records dropped because a later or newer record shared their natural key.
    pub collapsed_duplicates: usize,
    pub staged: usize,
}

/// Normalizes a single staged record.
///
/// Malformed lifecycle timestamps become absent values. Header artifacts, a blank order id
/// and a missing or unparseable load timestamp reject the record.
pub fn normalize_record(
    position: usize,
    record: &RawStagedRecord,
) -> Result<Candidate, RejectedRecord> {
    let natural_key = non_blank(record.order_id.as_deref()).map(str::to_owned);
    let reject = |reason| RejectedRecord {
        position,
        natural_key: natural_key.clone(),
        reason,
    };

    if let Some(column) = record.header_column() {
        return Err(reject(RejectReason::HeaderRow { column }));
    }

    let Some(natural_key) = natural_key.clone() else {
        return Err(reject(RejectReason::MissingNaturalKey));
    };

    let Some(raw_load_time) = non_blank(record.load_timestamp.as_deref()) else {
        return Err(reject(RejectReason::MissingLoadTime));
    };
    let Some(batch_load_time) = parse_timestamp(raw_load_time) else {
        return Err(reject(RejectReason::InvalidLoadTime {
            value: raw_load_time.to_owned(),
        }));
    };

    let timestamp = |value: &Option<String>| value.as_deref().and_then(parse_timestamp);

    Ok(Candidate {
        natural_key,
        customer_reference: record.customer_id.clone(),
        tracked: TrackedAttributes {
            status: record.order_status.clone(),
            purchased_at: timestamp(&record.order_purchase_timestamp),
            approved_at: timestamp(&record.order_approved_at),
            delivered_carrier_at: timestamp(&record.order_delivered_carrier_date),
            delivered_customer_at: timestamp(&record.order_delivered_customer_date),
            estimated_delivery_at: timestamp(&record.order_estimated_delivery_date),
        },
        batch_load_time,
        position,
    })
}

/// Normalizes a staged batch and collapses duplicate natural keys.
///
/// Among records sharing a natural key, the one with the latest load time wins; on equal
/// load times the later record in the batch wins.
pub fn normalize_batch(records: &[RawStagedRecord]) -> NormalizedBatch {
    let mut rejected = Vec::new();
    let mut winners: HashMap<String, Candidate> = HashMap::with_capacity(records.len());
    let mut collapsed_duplicates = 0;

    for (position, record) in records.iter().enumerate() {
        let candidate = match normalize_record(position, record) {
            Ok(candidate) => candidate,
            Err(rejection) => {
                warn!(
                    position = rejection.position,
                    natural_key = rejection.natural_key.as_deref().unwrap_or_default(),
                    reason = %rejection.reason,
                    "rejected staged record"
                );
                rejected.push(rejection);
                continue;
            }
        };

        match winners.entry(candidate.natural_key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(candidate);
            }
            Entry::Occupied(mut entry) => {
                collapsed_duplicates += 1;
                if supersedes(&candidate, entry.get()) {
                    entry.insert(candidate);
                }
            }
        }
    }

    let mut candidates: Vec<Candidate> = winners.into_values().collect();
    candidates.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));

    NormalizedBatch {
        candidates,
        rejected,
        collapsed_duplicates,
        staged: records.len(),
    }
}

fn supersedes(challenger: &Candidate, incumbent: &Candidate) -> bool {
    (challenger.batch_load_time, challenger.position)
        > (incumbent.batch_load_time, incumbent.position)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
