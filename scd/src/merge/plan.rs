use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::fingerprint::compute_fingerprint;
use crate::keys::SurrogateKeyAllocator;
use crate::types::{Candidate, Fingerprint, OrderVersion, SurrogateKey, VALID_TO_SENTINEL};

/// Closing of a current version superseded by a changed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionClose {
    pub surrogate_key: SurrogateKey,
    pub natural_key: String,
    /// Load time of the superseding record.
    pub valid_to: NaiveDateTime,
    /// Fingerprint of the superseding record; the closed row stores it.
    pub content_fingerprint: Fingerprint,
}

/// A changed record that is not newer than the current version it would replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRecord {
    pub natural_key: String,
    pub batch_load_time: NaiveDateTime,
    pub current_valid_from: NaiveDateTime,
}

/// How a candidate was classified against the current versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeAction {
    Insert,
    Change,
    Unchanged,
    Stale,
}

impl MergeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeAction::Insert => "inserted",
            MergeAction::Change => "changed",
            MergeAction::Unchanged => "unchanged",
            MergeAction::Stale => "stale",
        }
    }
}

/// Every write one merge run performs, applied by the store as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Maximum surrogate key of the store when the plan was built.
    pub base_max_surrogate_key: Option<SurrogateKey>,
    pub closes: Vec<VersionClose>,
    /// New current versions, in allocation order.
    pub inserts: Vec<OrderVersion>,
    pub unchanged: Vec<String>,
    pub stale: Vec<StaleRecord>,
}

impl MergePlan {
    /// Returns `true` if applying the plan would not write anything.
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty() && self.inserts.is_empty()
    }

    /// Number of natural keys seen for the first time.
    pub fn new_keys(&self) -> usize {
        let closing = self.closing_natural_keys();

        self.inserts
            .iter()
            .filter(|version| !closing.contains(version.natural_key.as_str()))
            .count()
    }

    pub fn changed_keys(&self) -> usize {
        self.closes.len()
    }

    pub fn count(&self, action: MergeAction) -> usize {
        match action {
            MergeAction::Insert => self.new_keys(),
            MergeAction::Change => self.changed_keys(),
            MergeAction::Unchanged => self.unchanged.len(),
            MergeAction::Stale => self.stale.len(),
        }
    }

    /// Natural keys the plan writes to, in ascending order.
    pub fn touched_natural_keys(&self) -> BTreeSet<&str> {
        self.inserts
            .iter()
            .map(|version| version.natural_key.as_str())
            .chain(self.closes.iter().map(|close| close.natural_key.as_str()))
            .collect()
    }

    fn closing_natural_keys(&self) -> HashSet<&str> {
        self.closes
            .iter()
            .map(|close| close.natural_key.as_str())
            .collect()
    }

    /// Checks that the plan is consistent on its own, before any store state is consulted.
    ///
    /// Every close must be followed by exactly one new current version of the same natural
    /// key starting where the closed one ends, and new surrogate keys must increase from the
    /// plan's base.
    pub fn check_well_formed(&self) -> ScdResult<()> {
        let mut inserted: HashMap<&str, &OrderVersion> = HashMap::with_capacity(self.inserts.len());
        let mut previous_key = self.base_max_surrogate_key;

        for version in &self.inserts {
            if previous_key.is_some_and(|previous| version.surrogate_key <= previous) {
                bail!(
                    ErrorKind::InvalidState,
                    "Merge plan inserts a surrogate key that is not increasing",
                    format!(
                        "surrogate_key: {}, previous: {previous_key:?}",
                        version.surrogate_key
                    )
                );
            }
            previous_key = Some(version.surrogate_key);

            if !version.is_current || version.valid_to != *VALID_TO_SENTINEL {
                bail!(
                    ErrorKind::InvalidState,
                    "Merge plan inserts a version that is not current",
                    format!("natural_key: {}", version.natural_key)
                );
            }

            if inserted
                .insert(version.natural_key.as_str(), version)
                .is_some()
            {
                bail!(
                    ErrorKind::InvalidState,
                    "Merge plan inserts two versions of a natural key",
                    format!("natural_key: {}", version.natural_key)
                );
            }
        }

        let mut closing = HashSet::with_capacity(self.closes.len());
        for close in &self.closes {
            if !closing.insert(close.natural_key.as_str()) {
                bail!(
                    ErrorKind::InvalidState,
                    "Merge plan closes two versions of a natural key",
                    format!("natural_key: {}", close.natural_key)
                );
            }

            let successor_starts_at_close = inserted
                .get(close.natural_key.as_str())
                .is_some_and(|successor| successor.valid_from == close.valid_to);
            if !successor_starts_at_close {
                bail!(
                    ErrorKind::InvalidState,
                    "Merge plan closes a version without inserting its successor",
                    format!(
                        "natural_key: {}, surrogate_key: {}, valid_to: {}",
                        close.natural_key, close.surrogate_key, close.valid_to
                    )
                );
            }
        }

        Ok(())
    }
}

/// Classifies candidates against the current versions and builds the plan for the run.
///
/// `candidates` must hold at most one record per natural key. `current` maps natural keys to
/// their current version. New versions get keys from `allocator` in ascending natural key
/// order.
pub fn plan_merge(
    candidates: &[Candidate],
    current: &HashMap<String, OrderVersion>,
    allocator: &SurrogateKeyAllocator,
) -> ScdResult<MergePlan> {
    let mut seen = HashSet::with_capacity(candidates.len());
    for candidate in candidates {
        if !seen.insert(candidate.natural_key.as_str()) {
            bail!(
                ErrorKind::DuplicateNaturalKey,
                "Merge input holds more than one record for a natural key",
                format!("natural_key: {}", candidate.natural_key)
            );
        }
    }

    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));

    let mut plan = MergePlan {
        base_max_surrogate_key: allocator.base(),
        ..Default::default()
    };

    for candidate in ordered {
        let fingerprint = compute_fingerprint(&candidate.tracked);

        let action = match current.get(&candidate.natural_key) {
            None => MergeAction::Insert,
            Some(version) if !version.is_current => {
                bail!(
                    ErrorKind::InvalidState,
                    "Store returned a closed version as current",
                    format!(
                        "natural_key: {}, surrogate_key: {}",
                        version.natural_key, version.surrogate_key
                    )
                );
            }
            Some(version) if version.content_fingerprint == fingerprint => {
                MergeAction::Unchanged
            }
            Some(version) if candidate.batch_load_time <= version.valid_from => {
                plan.stale.push(StaleRecord {
                    natural_key: candidate.natural_key.clone(),
                    batch_load_time: candidate.batch_load_time,
                    current_valid_from: version.valid_from,
                });
                MergeAction::Stale
            }
            Some(version) => {
                plan.closes.push(VersionClose {
                    surrogate_key: version.surrogate_key,
                    natural_key: version.natural_key.clone(),
                    valid_to: candidate.batch_load_time,
                    content_fingerprint: fingerprint.clone(),
                });
                MergeAction::Change
            }
        };

        debug!(
            natural_key = %candidate.natural_key,
            action = action.as_str(),
            "classified candidate"
        );

        match action {
            MergeAction::Insert | MergeAction::Change => {
                plan.inserts
                    .push(new_current_version(candidate, fingerprint, allocator.allocate()?));
            }
            MergeAction::Unchanged => plan.unchanged.push(candidate.natural_key.clone()),
            MergeAction::Stale => {}
        }
    }

    Ok(plan)
}

fn new_current_version(
    candidate: &Candidate,
    content_fingerprint: Fingerprint,
    surrogate_key: SurrogateKey,
) -> OrderVersion {
    OrderVersion {
        surrogate_key,
        natural_key: candidate.natural_key.clone(),
        customer_reference: candidate.customer_reference.clone(),
        tracked: candidate.tracked.clone(),
        load_timestamp: candidate.batch_load_time,
        content_fingerprint,
        valid_from: candidate.batch_load_time,
        valid_to: *VALID_TO_SENTINEL,
        is_current: true,
    }
}
