//! Change detection over [`TrackedAttributes`].

use std::fmt::Write;

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

use crate::types::{Fingerprint, TrackedAttributes};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Serializes tracked attributes in a fixed field order.
///
/// Each field is written as `<byte length>:<value>;` with absent values as the empty string,
/// so distinct attribute tuples never share a canonical form.
pub fn canonical_form(tracked: &TrackedAttributes) -> String {
    let timestamps = [
        tracked.purchased_at,
        tracked.approved_at,
        tracked.delivered_carrier_at,
        tracked.delivered_customer_at,
        tracked.estimated_delivery_at,
    ];

    let mut out = String::with_capacity(160);
    push_field(&mut out, tracked.status.as_deref().unwrap_or_default());
    for timestamp in timestamps {
        push_field(&mut out, &render_timestamp(timestamp));
    }

    out
}

/// Computes the content fingerprint of a set of tracked attributes.
pub fn compute_fingerprint(tracked: &TrackedAttributes) -> Fingerprint {
    let digest = Sha256::digest(canonical_form(tracked).as_bytes());
    Fingerprint::from_digest_hex(format!("{digest:x}"))
}

fn render_timestamp(timestamp: Option<NaiveDateTime>) -> String {
    timestamp
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn push_field(out: &mut String, value: &str) {
    // Writing into a String never fails.
    let _ = write!(out, "{}:{};", value.len(), value);
}
