//! Time and space overlap tests between user history and feed reports.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

use crate::config::MatchingConfig;
use crate::types::{Observation, SickReport};

/// Unit the configured radii are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    /// Meters.
    #[default]
    #[serde(alias = "m")]
    Meter,
    /// Kilometers.
    #[serde(rename = "km")]
    Kilometer,
    /// Statute miles.
    Mile,
    /// Nautical miles.
    #[serde(rename = "nmi")]
    NauticalMile,
}

impl DistanceUnit {
    /// Convert a distance in meters to this unit.
    #[must_use]
    pub fn from_meters(self, meters: f64) -> f64 {
        match self {
            Self::Meter => meters,
            Self::Kilometer => meters / 1_000.0,
            Self::Mile => meters / 1_609.344,
            Self::NauticalMile => meters / 1_852.0,
        }
    }
}

/// Great-circle distance in meters between two `(lat, long)` pairs.
#[must_use]
pub fn haversine_meters(from: (f64, f64), to: (f64, f64)) -> f64 {
    let a = Point::new(from.1, from.0);
    let b = Point::new(to.1, to.0);
    Haversine::distance(a, b)
}

/// `true` if `min(ends) - max(starts)` strictly exceeds `threshold_millis`.
///
/// Zero or negative overlap is never a match, whatever the threshold.
#[must_use]
pub fn is_time_overlapping(
    sample: &impl Observation,
    report: &SickReport,
    threshold_millis: i64,
) -> bool {
    let overlap = sample.window().overlap_millis(&report.window());
    overlap > 0 && overlap > threshold_millis
}

/// `true` if the sample lies within the report's radius plus the sample's
/// dwell radius (clusters only).
///
/// Reports whose coordinates cannot be read at the configured indices never match.
#[must_use]
pub fn is_space_overlapping(
    sample: &impl Observation,
    report: &SickReport,
    matching: &MatchingConfig,
) -> bool {
    let Some(report_position) = report.position(
        matching.sick_geometry_lat_index,
        matching.sick_geometry_long_index,
    ) else {
        return false;
    };

    let dwell = if matching.intersect_with_clusters {
        sample.dwell_radius()
    } else {
        0.0
    };
    let threshold = report.radius.unwrap_or(matching.meter_radius) + dwell;

    let meters = haversine_meters((sample.latitude(), sample.longitude()), report_position);
    matching.buffer_units.from_meters(meters) <= threshold
}

/// Time is checked first; space only matters once the windows overlap.
#[must_use]
pub fn is_overlapping(
    sample: &impl Observation,
    report: &SickReport,
    matching: &MatchingConfig,
) -> bool {
    is_time_overlapping(sample, report, matching.intersect_threshold_millis())
        && is_space_overlapping(sample, report, matching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClusterSample, LocationSample};

    fn sample(lat: f64, long: f64, start: i64, end: i64) -> LocationSample {
        LocationSample {
            latitude: lat,
            longitude: long,
            start_time: start,
            end_time: end,
            geohash: String::new(),
        }
    }

    fn report(lat: f64, long: f64, radius: Option<f64>, from: i64, to: i64) -> SickReport {
        SickReport {
            source_id: "r1".into(),
            from_time_utc: from,
            to_time_utc: to,
            radius,
            coordinates: vec![long, lat],
            geohash_filter: None,
        }
    }

    #[test]
    fn test_time_overlap_respects_threshold() {
        let s = sample(32.0, 34.0, 1000, 5000);
        let r = report(32.0, 34.0, None, 2000, 6000);
        assert!(is_time_overlapping(&s, &r, 0));
        assert!(is_time_overlapping(&s, &r, 2999));
        assert!(!is_time_overlapping(&s, &r, 3000));
    }

    #[test]
    fn test_zero_and_negative_overlap_never_match() {
        let touching = sample(32.0, 34.0, 1000, 2000);
        let disjoint = sample(32.0, 34.0, 0, 500);
        let r = report(32.0, 34.0, None, 2000, 6000);
        assert!(!is_time_overlapping(&touching, &r, 0));
        assert!(!is_time_overlapping(&disjoint, &r, 0));
        // a negative threshold does not turn a gap into a match
        assert!(!is_time_overlapping(&disjoint, &r, -10_000));
    }

    #[test]
    fn test_space_overlap_uses_report_radius() {
        let matching = MatchingConfig::default();
        // ~111m north of the report
        let s = sample(32.001, 34.0, 0, 1);
        assert!(is_space_overlapping(&s, &report(32.0, 34.0, Some(150.0), 0, 1), &matching));
        assert!(!is_space_overlapping(&s, &report(32.0, 34.0, Some(50.0), 0, 1), &matching));
    }

    #[test]
    fn test_space_overlap_falls_back_to_default_radius() {
        let matching = MatchingConfig {
            meter_radius: 200.0,
            ..MatchingConfig::default()
        };
        let s = sample(32.001, 34.0, 0, 1);
        assert!(is_space_overlapping(&s, &report(32.0, 34.0, None, 0, 1), &matching));
    }

    #[test]
    fn test_cluster_radius_only_counts_in_cluster_mode() {
        let cluster = ClusterSample {
            latitude: 32.001,
            longitude: 34.0,
            start_time: 0,
            end_time: 1,
            geohash: String::new(),
            radius: 100.0,
        };
        let r = report(32.0, 34.0, Some(50.0), 0, 1);

        let plain = MatchingConfig::default();
        assert!(!is_space_overlapping(&cluster, &r, &plain));

        let clustered = MatchingConfig {
            intersect_with_clusters: true,
            ..MatchingConfig::default()
        };
        assert!(is_space_overlapping(&cluster, &r, &clustered));
    }

    #[test]
    fn test_distance_units() {
        let matching = MatchingConfig {
            buffer_units: DistanceUnit::Kilometer,
            ..MatchingConfig::default()
        };
        // ~11km apart, radius 12km
        let s = sample(32.1, 34.0, 0, 1);
        assert!(is_space_overlapping(&s, &report(32.0, 34.0, Some(12.0), 0, 1), &matching));
        assert!(!is_space_overlapping(&s, &report(32.0, 34.0, Some(10.0), 0, 1), &matching));
    }

    #[test]
    fn test_missing_coordinates_never_match() {
        let matching = MatchingConfig::default();
        let mut r = report(32.0, 34.0, Some(1000.0), 0, 1);
        r.coordinates = vec![34.0];
        assert!(!is_space_overlapping(&sample(32.0, 34.0, 0, 1), &r, &matching));
    }

    #[test]
    fn test_space_is_irrelevant_without_time_overlap() {
        let matching = MatchingConfig::default();
        let s = sample(32.0, 34.0, 0, 1000);
        let r = report(32.0, 34.0, Some(1000.0), 5000, 6000);
        assert!(is_space_overlapping(&s, &r, &matching));
        assert!(!is_overlapping(&s, &r, &matching));
    }
}
