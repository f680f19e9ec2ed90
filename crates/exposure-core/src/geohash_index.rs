//! Geohash bucketing of the user's location history.
//!
//! Samples are grouped by a truncated geohash prefix whose length matches the
//! feed's `geohashFilter`. A report then only has to be tested against the
//! samples in its own cell and the eight cells around it.

use std::collections::HashMap;

use geohash::Coord;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::MatchingConfig;
use crate::error::{ExposureError, Result};
use crate::types::{Observation, SickReport};

/// Base-32 geohash alphabet (no `a`, `i`, `l`, `o`).
static GEOHASH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9b-hjkmnp-z]+$").expect("geohash pattern is valid"));

/// Returns `true` if `hash` is a non-empty, lowercase geohash.
#[must_use]
pub fn is_valid_geohash(hash: &str) -> bool {
    GEOHASH_PATTERN.is_match(hash)
}

/// Strip quote characters left by timeline exports, lowercase, and truncate.
#[must_use]
pub fn normalize_prefix(geohash: &str, prefix_len: usize) -> String {
    geohash
        .chars()
        .filter(|c| !matches!(c, '\'' | '"'))
        .take(prefix_len)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The report's own cell at `prefix_len`.
///
/// Uses the published filter when present, otherwise encodes the report's
/// coordinates.
///
/// # Errors
///
/// Returns [`ExposureError::InvalidReport`] if no valid prefix can be derived.
pub fn report_prefix(
    report: &SickReport,
    prefix_len: usize,
    matching: &MatchingConfig,
) -> Result<String> {
    let invalid = |reason: String| ExposureError::InvalidReport {
        source_id: report.source_id.clone(),
        reason,
    };

    let prefix = match report.geohash_filter.as_deref() {
        Some(filter) if !filter.is_empty() => normalize_prefix(filter, prefix_len),
        _ => {
            let (lat, long) = report
                .position(
                    matching.sick_geometry_lat_index,
                    matching.sick_geometry_long_index,
                )
                .ok_or_else(|| invalid("coordinates missing at configured indices".into()))?;
            geohash::encode(Coord { x: long, y: lat }, prefix_len)
                .map_err(|e| invalid(format!("cannot encode position: {e}")))?
        }
    };

    if is_valid_geohash(&prefix) {
        Ok(prefix)
    } else {
        Err(invalid(format!("'{prefix}' is not a geohash")))
    }
}

/// `prefix` followed by its eight neighbours.
///
/// # Errors
///
/// Returns an error if `prefix` is not a decodable geohash.
pub fn neighbourhood(prefix: &str) -> Result<Vec<String>> {
    let n = geohash::neighbors(prefix).map_err(|e| ExposureError::InvalidReport {
        source_id: prefix.to_string(),
        reason: format!("cannot compute geohash neighbours: {e}"),
    })?;
    Ok(vec![
        prefix.to_string(),
        n.n,
        n.ne,
        n.e,
        n.se,
        n.s,
        n.sw,
        n.w,
        n.nw,
    ])
}

/// Location history grouped by geohash prefix.
#[derive(Debug)]
pub struct GeohashIndex<'a, T> {
    prefix_len: usize,
    buckets: HashMap<String, Vec<&'a T>>,
}

impl<'a, T: Observation> GeohashIndex<'a, T> {
    /// Bucket `samples` by their first `prefix_len` geohash characters.
    ///
    /// Bucket contents keep the order of `samples`.
    #[must_use]
    pub fn build(samples: &'a [T], prefix_len: usize) -> Self {
        let mut buckets: HashMap<String, Vec<&'a T>> = HashMap::new();
        for sample in samples {
            buckets
                .entry(normalize_prefix(sample.geohash(), prefix_len))
                .or_default()
                .push(sample);
        }
        Self {
            prefix_len,
            buckets,
        }
    }

    /// Prefix length the index was built with.
    #[must_use]
    pub const fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Number of non-empty buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Samples sharing exactly `prefix`.
    #[must_use]
    pub fn bucket(&self, prefix: &str) -> &[&'a T] {
        self.buckets.get(prefix).map(Vec::as_slice).unwrap_or_default()
    }

    /// Samples in `prefix`'s cell and its eight neighbours.
    ///
    /// # Errors
    ///
    /// Returns an error if `prefix` is not a decodable geohash.
    pub fn candidates(&self, prefix: &str) -> Result<Vec<&'a T>> {
        let mut found = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for cell in neighbourhood(prefix)? {
            // neighbour cells repeat near the poles
            if seen.insert(cell.clone()) {
                found.extend(self.bucket(&cell).iter().copied());
            }
        }
        Ok(found)
    }
}
