use std::collections::BTreeMap;

use thiserror::Error;

/// Delimiter separating segments of a hierarchical counter name.
pub const NAME_DELIMITER: &str = ">>>";

/// Minimum segment count of a well-formed counter name:
/// `[namespace, user, discriminator, kind]`.
pub const MIN_NAME_SEGMENTS: usize = 4;

/// One counter exactly as reported by a stats service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStat {
    pub name: String,
    pub value: i64,
}

/// A counter with its hierarchical name decoded into structured fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStat {
    /// Account the counter belongs to (segment 1 of the name).
    pub user: String,
    /// Counter category, e.g. "uplink" or "downlink" (segment 3 of the name).
    pub kind: String,
    pub value: i64,
}

/// Per-cycle mapping from source label to its decoded stats.
///
/// A label is present only when its source produced at least one decoded
/// stat; iteration order is the label order, so batch bodies built from the
/// aggregate are deterministic.
pub type ServerAggregate = BTreeMap<String, Vec<DecodedStat>>;

/// A counter name that does not follow the hierarchical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed stat name {name:?}: {segments} segment(s), need at least 4")]
pub struct DecodeError {
    pub name: String,
    pub segments: usize,
}

/// Decodes a raw counter into structured fields.
///
/// Names carry at least four `>>>`-separated segments; the user is segment 1
/// and the kind segment 3. Shorter names are rejected rather than indexed.
pub fn decode(raw: &RawStat) -> Result<DecodedStat, DecodeError> {
    let segments: Vec<&str> = raw.name.split(NAME_DELIMITER).collect();
    if segments.len() < MIN_NAME_SEGMENTS {
        return Err(DecodeError {
            name: raw.name.clone(),
            segments: segments.len(),
        });
    }

    Ok(DecodedStat {
        user: segments[1].to_string(),
        kind: segments[3].to_string(),
        value: raw.value,
    })
}
