//! Core data types of the historized order dimension.

use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};

use crate::bail;
use crate::error::{ErrorKind, ScdResult};

/// Identifier of a single order version. Never reused.
pub type SurrogateKey = i64;

/// `valid_to` of every current version.
pub static VALID_TO_SENTINEL: LazyLock<NaiveDateTime> = LazyLock::new(|| {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .expect("9999-12-31 23:59:59 is a valid timestamp")
});

/// Attributes whose changes produce a new version.
///
/// The customer reference and the load timestamp are carried on the version but are not
/// part of this set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TrackedAttributes {
    pub status: Option<String>,
    pub purchased_at: Option<NaiveDateTime>,
    pub approved_at: Option<NaiveDateTime>,
    pub delivered_carrier_at: Option<NaiveDateTime>,
    pub delivered_customer_at: Option<NaiveDateTime>,
    pub estimated_delivery_at: Option<NaiveDateTime>,
}

/// SHA-256 digest of [`TrackedAttributes`], as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const HEX_LEN: usize = 64;

    /// Wraps a digest read back from a store, checking its shape.
    pub fn from_hex(value: impl Into<String>) -> ScdResult<Self> {
        let value = value.into();
        let well_formed = value.len() == Self::HEX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        if !well_formed {
            bail!(
                ErrorKind::ConversionError,
                "Stored content fingerprint is malformed",
                format!("expected {} lowercase hex characters, got '{value}'", Self::HEX_LEN)
            );
        }

        Ok(Self(value))
    }

    pub(crate) fn from_digest_hex(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One historized state of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderVersion {
    pub surrogate_key: SurrogateKey,
    pub natural_key: String,
    pub customer_reference: Option<String>,
    pub tracked: TrackedAttributes,
    /// Load time of the batch this version was built from.
    pub load_timestamp: NaiveDateTime,
    pub content_fingerprint: Fingerprint,
    pub valid_from: NaiveDateTime,
    pub valid_to: NaiveDateTime,
    pub is_current: bool,
}

impl OrderVersion {
    /// Returns `true` if `instant` falls in `[valid_from, valid_to)`.
    pub fn is_valid_at(&self, instant: NaiveDateTime) -> bool {
        self.valid_from <= instant && instant < self.valid_to
    }

    /// Calendar date the version is partitioned by.
    pub fn partition_date(&self) -> NaiveDate {
        self.valid_from.date()
    }
}

/// A normalized staged record, ready to be fingerprinted and matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub natural_key: String,
    pub customer_reference: Option<String>,
    pub tracked: TrackedAttributes,
    pub batch_load_time: NaiveDateTime,
    /// Zero-based position of the record in its staged batch.
    pub position: usize,
}
