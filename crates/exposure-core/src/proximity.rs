//! Proximity encounter normalization and selection.
//!
//! The proximity log reports contacts in epoch seconds. Only the most recent
//! well-formed contact of a batch is considered per check.

use crate::error::{ExposureError, Result};
use crate::types::{ContactInterval, ProximityEncounter};

const MILLIS_PER_SECOND: i64 = 1_000;

/// Convert an encounter from seconds to a millisecond interval.
///
/// # Errors
///
/// Returns [`ExposureError::MalformedEncounter`] for negative timestamps, an
/// end before the start, or values that overflow when scaled.
pub fn normalize(encounter: &ProximityEncounter) -> Result<ContactInterval> {
    let start = encounter.start_contact_timestamp;
    let end = encounter.end_contact_timestamp;
    let malformed = |reason: &str| ExposureError::MalformedEncounter {
        start,
        end,
        reason: reason.to_string(),
    };

    if start < 0 || end < 0 {
        return Err(malformed("negative timestamp"));
    }
    if end < start {
        return Err(malformed("contact ends before it starts"));
    }
    let start_ms = start
        .checked_mul(MILLIS_PER_SECOND)
        .ok_or_else(|| malformed("start overflows milliseconds"))?;
    let end_ms = end
        .checked_mul(MILLIS_PER_SECOND)
        .ok_or_else(|| malformed("end overflows milliseconds"))?;

    Ok(ContactInterval { start_ms, end_ms })
}

/// Result of picking the contact to evaluate from a batch.
#[derive(Debug, Default)]
pub struct Selection {
    /// The most recent well-formed contact.
    pub latest: Option<ContactInterval>,
    /// Encounters that failed normalization, newest first.
    pub rejected: Vec<ExposureError>,
}

/// Pick the most recent encounter by start time that normalizes cleanly.
///
/// Malformed encounters newer than the chosen one are returned in
/// [`Selection::rejected`] instead of aborting the batch.
#[must_use]
pub fn select_latest(encounters: &[ProximityEncounter]) -> Selection {
    let mut newest_first: Vec<&ProximityEncounter> = encounters.iter().collect();
    newest_first.sort_by(|a, b| b.start_contact_timestamp.cmp(&a.start_contact_timestamp));

    let mut selection = Selection::default();
    for encounter in newest_first {
        match normalize(encounter) {
            Ok(interval) => {
                selection.latest = Some(interval);
                break;
            }
            Err(err) => selection.rejected.push(err),
        }
    }
    selection
}
