//! Shared data model.
//!
//! Location history, feed reports, proximity encounters, and the canonical
//! [`IntersectionRecord`] persisted by the registry. All timestamps are epoch
//! milliseconds (UTC) unless a field says otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Milliseconds since the Unix epoch (UTC).
pub type EpochMillis = i64;

/// Length of a proximity bucket.
pub const HOUR_MILLIS: EpochMillis = 3_600_000;

/// Truncate a timestamp to the start of its UTC hour.
#[must_use]
pub const fn floor_to_hour(ts: EpochMillis) -> EpochMillis {
    ts - ts.rem_euclid(HOUR_MILLIS)
}

/// A half-open time interval `[from_utc, to_utc)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct TimeWindow {
    /// Start of the window.
    pub from_utc: EpochMillis,
    /// End of the window.
    pub to_utc: EpochMillis,
}

impl TimeWindow {
    /// Create a window.
    #[must_use]
    pub const fn new(from_utc: EpochMillis, to_utc: EpochMillis) -> Self {
        Self { from_utc, to_utc }
    }

    /// The one-hour bucket a proximity timestamp falls into.
    #[must_use]
    pub const fn hour_bucket(ts: EpochMillis) -> Self {
        let start = floor_to_hour(ts);
        Self::new(start, start + HOUR_MILLIS)
    }

    /// `min(ends) - max(starts)`. Zero or negative means the windows do not overlap.
    #[must_use]
    pub fn overlap_millis(&self, other: &Self) -> EpochMillis {
        self.to_utc.min(other.to_utc) - self.from_utc.max(other.from_utc)
    }

    /// The shared part of both windows, if it has positive length.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        (self.overlap_millis(other) > 0).then(|| {
            Self::new(
                self.from_utc.max(other.from_utc),
                self.to_utc.min(other.to_utc),
            )
        })
    }
}

// =============================================================================
// LOCATION HISTORY
// =============================================================================

/// Anything from the user's history that can be matched against a report.
pub trait Observation {
    /// Latitude in degrees.
    fn latitude(&self) -> f64;
    /// Longitude in degrees.
    fn longitude(&self) -> f64;
    /// When the user was there.
    fn window(&self) -> TimeWindow;
    /// Precomputed geohash of the position.
    fn geohash(&self) -> &str;
    /// Extra buffer added to the report radius. Zero for raw samples.
    fn dwell_radius(&self) -> f64 {
        0.0
    }
}

impl<T: Observation + ?Sized> Observation for &T {
    fn latitude(&self) -> f64 {
        (**self).latitude()
    }

    fn longitude(&self) -> f64 {
        (**self).longitude()
    }

    fn window(&self) -> TimeWindow {
        (**self).window()
    }

    fn geohash(&self) -> &str {
        (**self).geohash()
    }

    fn dwell_radius(&self) -> f64 {
        (**self).dwell_radius()
    }
}

/// A single point observation from the location history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Latitude in degrees.
    #[serde(alias = "lat")]
    pub latitude: f64,
    /// Longitude in degrees.
    #[serde(alias = "long")]
    pub longitude: f64,
    /// Start of the observation.
    pub start_time: EpochMillis,
    /// End of the observation.
    pub end_time: EpochMillis,
    /// Geohash of the position. May carry stray quotes from timeline imports.
    #[serde(alias = "geoHash")]
    pub geohash: String,
}

impl Observation for LocationSample {
    fn latitude(&self) -> f64 {
        self.latitude
    }

    fn longitude(&self) -> f64 {
        self.longitude
    }

    fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    fn geohash(&self) -> &str {
        &self.geohash
    }
}

/// An aggregated dwell area built from many samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSample {
    /// Centre latitude in degrees.
    #[serde(alias = "lat")]
    pub latitude: f64,
    /// Centre longitude in degrees.
    #[serde(alias = "long")]
    pub longitude: f64,
    /// Start of the dwell.
    pub start_time: EpochMillis,
    /// End of the dwell.
    pub end_time: EpochMillis,
    /// Geohash of the centre.
    #[serde(alias = "geoHash")]
    pub geohash: String,
    /// Dwell radius, in the configured buffer unit.
    pub radius: f64,
}

impl Observation for ClusterSample {
    fn latitude(&self) -> f64 {
        self.latitude
    }

    fn longitude(&self) -> f64 {
        self.longitude
    }

    fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    fn geohash(&self) -> &str {
        &self.geohash
    }

    fn dwell_radius(&self) -> f64 {
        self.radius
    }
}

// =============================================================================
// FEED
// =============================================================================

/// One report from the exposure feed. Read-only inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SickReport {
    /// Unique identifier of the report.
    pub source_id: String,
    /// Start of the exposure window.
    pub from_time_utc: EpochMillis,
    /// End of the exposure window.
    pub to_time_utc: EpochMillis,
    /// Exposure radius. The configured default applies when absent.
    pub radius: Option<f64>,
    /// Raw coordinate array; lat/long positions come from configuration.
    pub coordinates: Vec<f64>,
    /// Geohash prefix enabling bucketed matching.
    pub geohash_filter: Option<String>,
}

impl SickReport {
    /// The published exposure window.
    #[must_use]
    pub const fn window(&self) -> TimeWindow {
        TimeWindow::new(self.from_time_utc, self.to_time_utc)
    }

    /// `(latitude, longitude)` read from the configured coordinate indices.
    #[must_use]
    pub fn position(&self, lat_index: usize, long_index: usize) -> Option<(f64, f64)> {
        Some((
            *self.coordinates.get(lat_index)?,
            *self.coordinates.get(long_index)?,
        ))
    }
}

/// A verified feed document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SickFeed {
    /// Reports in feed order.
    pub reports: Vec<SickReport>,
}

impl SickFeed {
    /// Prefix length for bucketed matching, taken from the first report.
    ///
    /// `None` selects full-scan matching.
    #[must_use]
    pub fn geohash_filter_len(&self) -> Option<usize> {
        self.reports
            .first()
            .and_then(|report| report.geohash_filter.as_deref())
            .map(str::len)
            .filter(|len| *len > 0)
    }
}

/// A report that overlapped the user's history, annotated with the overlap.
///
/// The report itself is never modified; the narrowed window travels alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedReport {
    /// The report as published.
    pub report: SickReport,
    /// Where the report and the user's history overlap.
    pub overlap: TimeWindow,
}

impl MatchedReport {
    /// Identifier of the underlying report.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.report.source_id
    }
}

// =============================================================================
// PROXIMITY
// =============================================================================

/// A Bluetooth contact as logged by the proximity subsystem (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityEncounter {
    /// Contact start, epoch seconds.
    pub start_contact_timestamp: i64,
    /// Contact end, epoch seconds.
    pub end_contact_timestamp: i64,
}

/// A proximity contact normalized to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactInterval {
    /// Contact start.
    pub start_ms: EpochMillis,
    /// Contact end.
    pub end_ms: EpochMillis,
}

impl ContactInterval {
    /// The hour bucket used for dedup and merge decisions.
    #[must_use]
    pub const fn bucket(&self) -> TimeWindow {
        TimeWindow::hour_bucket(self.start_ms)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Canonical record of a detected exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "0192d1f6-3f9a-7c4e-9a61-2b1c8d4e5f60",
    "source_id": "1473",
    "from_time_utc": 1_700_000_000_000_i64,
    "to_time_utc": 1_700_000_900_000_i64,
    "proximity_timestamp": null,
    "was_there": true,
    "created_at": "2025-01-15T03:30:00Z"
}))]
pub struct IntersectionRecord {
    /// Registry-assigned identifier.
    pub id: Uuid,

    /// Feed report id. `None` for proximity-only records.
    pub source_id: Option<String>,

    /// Start of the exposure window.
    pub from_time_utc: EpochMillis,

    /// End of the exposure window.
    pub to_time_utc: EpochMillis,

    /// Start of the corroborating Bluetooth contact, if any.
    pub proximity_timestamp: Option<EpochMillis>,

    /// `false` once the user has said they were not there.
    pub was_there: bool,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl IntersectionRecord {
    /// A new record from geo evidence.
    #[must_use]
    pub fn from_geo(matched: &MatchedReport) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_id: Some(matched.report.source_id.clone()),
            from_time_utc: matched.overlap.from_utc,
            to_time_utc: matched.overlap.to_utc,
            proximity_timestamp: None,
            was_there: true,
            created_at: Utc::now(),
        }
    }

    /// A new proximity-only record. Its window is the contact's hour bucket.
    #[must_use]
    pub fn from_proximity(ts: EpochMillis) -> Self {
        let bucket = TimeWindow::hour_bucket(ts);
        Self {
            id: Uuid::now_v7(),
            source_id: None,
            from_time_utc: bucket.from_utc,
            to_time_utc: bucket.to_utc,
            proximity_timestamp: Some(ts),
            was_there: true,
            created_at: Utc::now(),
        }
    }

    /// The record's exposure window.
    #[must_use]
    pub const fn window(&self) -> TimeWindow {
        TimeWindow::new(self.from_time_utc, self.to_time_utc)
    }

    /// The hour bucket of the proximity evidence, if any.
    #[must_use]
    pub fn proximity_bucket(&self) -> Option<TimeWindow> {
        self.proximity_timestamp.map(TimeWindow::hour_bucket)
    }

    /// Geo evidence only.
    #[must_use]
    pub const fn is_geo_only(&self) -> bool {
        self.source_id.is_some() && self.proximity_timestamp.is_none()
    }

    /// Proximity evidence only.
    #[must_use]
    pub const fn is_proximity_only(&self) -> bool {
        self.source_id.is_none() && self.proximity_timestamp.is_some()
    }
}
