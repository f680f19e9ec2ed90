//! Geo matching of the user's location history against the exposure feed.
//!
//! Two strategies share one result contract:
//! - **Full scan** tests every report against every sample.
//! - **Geohash-bucketed** (selected when the first report carries a
//!   `geohashFilter`) tests each report only against samples in its own and
//!   neighbouring geohash cells.
//!
//! Both return one [`MatchedReport`] per `source_id`, newest overlap first.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::MatchingConfig;
use crate::geohash_index::{report_prefix, GeohashIndex};
use crate::geometry::is_overlapping;
use crate::types::{MatchedReport, Observation, SickFeed, SickReport, TimeWindow};

/// Finds reports overlapping the user's history in time and space.
#[derive(Debug, Clone, Copy)]
pub struct GeoMatcher<'c> {
    matching: &'c MatchingConfig,
}

impl<'c> GeoMatcher<'c> {
    /// Create a matcher using the given thresholds.
    #[must_use]
    pub const fn new(matching: &'c MatchingConfig) -> Self {
        Self { matching }
    }

    /// Match `history` (in store order) against every report in `feed`.
    ///
    /// An empty history yields an empty result.
    #[must_use]
    pub fn find_intersections<T: Observation>(
        &self,
        history: &[T],
        feed: &SickFeed,
    ) -> Vec<MatchedReport> {
        if history.is_empty() {
            debug!("no location history to match against");
            return Vec::new();
        }

        // most recent first
        let recent_first: Vec<&T> = history.iter().rev().collect();

        let matches = match feed.geohash_filter_len() {
            Some(prefix_len) => self.match_bucketed(&recent_first, feed, prefix_len),
            None => self.match_full_scan(&recent_first, feed),
        };

        debug!(
            samples = history.len(),
            reports = feed.reports.len(),
            matched = matches.len(),
            "geo matching finished"
        );
        matches
    }

    /// Every report against every sample.
    #[must_use]
    pub fn match_full_scan<T: Observation>(
        &self,
        recent_first: &[&T],
        feed: &SickFeed,
    ) -> Vec<MatchedReport> {
        let mut found = MatchSet::default();
        for report in &feed.reports {
            for sample in recent_first {
                self.test(*sample, report, &mut found);
            }
        }
        found.into_sorted()
    }

    /// Each report against the samples in its nine surrounding geohash cells.
    #[must_use]
    pub fn match_bucketed<T: Observation>(
        &self,
        recent_first: &[&T],
        feed: &SickFeed,
        prefix_len: usize,
    ) -> Vec<MatchedReport> {
        let index = GeohashIndex::build(recent_first, prefix_len);
        debug!(
            prefix_len,
            buckets = index.bucket_count(),
            "built geohash index"
        );

        let mut found = MatchSet::default();
        for report in &feed.reports {
            let candidates = match report_prefix(report, prefix_len, self.matching)
                .and_then(|prefix| index.candidates(&prefix))
            {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!(source_id = %report.source_id, "skipping report: {err}");
                    continue;
                }
            };
            for sample in candidates {
                self.test(*sample, report, &mut found);
            }
        }
        found.into_sorted()
    }

    fn test<T: Observation>(&self, sample: &T, report: &SickReport, found: &mut MatchSet) {
        if !is_overlapping(sample, report, self.matching) {
            return;
        }
        if let Some(overlap) = sample.window().intersection(&report.window()) {
            found.record(report, overlap);
        }
    }
}

/// Matches keyed by `source_id`.
///
/// When several samples hit the same report, the overlap that starts latest
/// (then ends latest) is kept, so the outcome does not depend on iteration order.
#[derive(Debug, Default)]
struct MatchSet {
    by_source: HashMap<String, MatchedReport>,
}

impl MatchSet {
    fn record(&mut self, report: &SickReport, overlap: TimeWindow) {
        self.by_source
            .entry(report.source_id.clone())
            .and_modify(|existing| {
                if (overlap.from_utc, overlap.to_utc)
                    > (existing.overlap.from_utc, existing.overlap.to_utc)
                {
                    existing.overlap = overlap;
                }
            })
            .or_insert_with(|| MatchedReport {
                report: report.clone(),
                overlap,
            });
    }

    fn into_sorted(self) -> Vec<MatchedReport> {
        let mut matches: Vec<MatchedReport> = self.by_source.into_values().collect();
        sort_newest_first(&mut matches);
        matches
    }
}

/// Newest overlap first; ties broken by `source_id` so the order is total.
pub fn sort_newest_first(matches: &mut [MatchedReport]) {
    matches.sort_by(|a, b| {
        b.overlap
            .from_utc
            .cmp(&a.overlap.from_utc)
            .then_with(|| a.report.source_id.cmp(&b.report.source_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClusterSample, LocationSample};
    use geohash::Coord;

    fn sample(lat: f64, long: f64, start: i64, end: i64) -> LocationSample {
        LocationSample {
            latitude: lat,
            longitude: long,
            start_time: start,
            end_time: end,
            geohash: geohash::encode(Coord { x: long, y: lat }, 9).unwrap(),
        }
    }

    fn report(id: &str, lat: f64, long: f64, from: i64, to: i64) -> SickReport {
        SickReport {
            source_id: id.to_string(),
            from_time_utc: from,
            to_time_utc: to,
            radius: Some(50.0),
            coordinates: vec![long, lat],
            geohash_filter: None,
        }
    }

    fn with_filter(mut report: SickReport, len: usize) -> SickReport {
        let (lat, long) = report.position(1, 0).unwrap();
        report.geohash_filter = Some(geohash::encode(Coord { x: long, y: lat }, len).unwrap());
        report
    }

    #[test]
    fn test_empty_history_returns_empty() {
        let matching = MatchingConfig::default();
        let feed = SickFeed {
            reports: vec![report("1", 32.0, 34.0, 0, 10)],
        };
        let history: Vec<LocationSample> = Vec::new();
        assert!(GeoMatcher::new(&matching)
            .find_intersections(&history, &feed)
            .is_empty());
    }

    #[test]
    fn test_overlap_narrows_window_without_touching_report() {
        let matching = MatchingConfig::default();
        let feed = SickFeed {
            reports: vec![report("1", 32.0, 34.0, 2000, 6000)],
        };
        let history = vec![sample(32.0, 34.0, 1000, 5000)];

        let matches = GeoMatcher::new(&matching).find_intersections(&history, &feed);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].overlap, TimeWindow::new(2000, 5000));
        assert_eq!(matches[0].report.window(), TimeWindow::new(2000, 6000));
        assert_eq!(feed.reports[0].window(), TimeWindow::new(2000, 6000));
    }

    #[test]
    fn test_full_scan_dedups_by_source_id() {
        let matching = MatchingConfig::default();
        let feed = SickFeed {
            reports: vec![report("1", 32.0, 34.0, 0, 10_000)],
        };
        let history = vec![
            sample(32.0, 34.0, 1000, 2000),
            sample(32.0, 34.0, 3000, 4000),
            sample(32.0, 34.0, 5000, 6000),
        ];

        let matches = GeoMatcher::new(&matching).find_intersections(&history, &feed);

        assert_eq!(matches.len(), 1);
        // latest overlap wins
        assert_eq!(matches[0].overlap, TimeWindow::new(5000, 6000));
    }

    #[test]
    fn test_far_away_report_does_not_match() {
        let matching = MatchingConfig::default();
        let feed = SickFeed {
            reports: vec![report("1", 31.0, 35.0, 0, 10_000)],
        };
        let history = vec![sample(32.0, 34.0, 1000, 2000)];
        assert!(GeoMatcher::new(&matching)
            .find_intersections(&history, &feed)
            .is_empty());
    }

    #[test]
    fn test_bucketed_results_sorted_newest_first() {
        let matching = MatchingConfig::default();
        let feed = SickFeed {
            reports: vec![
                with_filter(report("old", 32.0, 34.0, 0, 2000), 5),
                with_filter(report("new", 32.0, 34.0, 5000, 9000), 5),
                with_filter(report("mid", 32.0, 34.0, 2500, 4000), 5),
            ],
        };
        let history = vec![sample(32.0, 34.0, 0, 10_000)];

        let ids: Vec<String> = GeoMatcher::new(&matching)
            .find_intersections(&history, &feed)
            .into_iter()
            .map(|m| m.report.source_id)
            .collect();

        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_bucketed_finds_sample_in_neighbouring_cell() {
        let matching = MatchingConfig::default();
        // a report right next to a cell edge, user just across it
        let prefix = "sv8wr";
        let (centre, _long_err, lat_err) = geohash::decode(prefix).unwrap();
        let edge_lat = centre.y + lat_err - 0.00005;
        let over_edge_lat = centre.y + lat_err + 0.00005;

        let mut r = report("edge", edge_lat, centre.x, 0, 10_000);
        r.geohash_filter = Some(prefix.to_string());
        let feed = SickFeed { reports: vec![r] };
        let history = vec![sample(over_edge_lat, centre.x, 1000, 2000)];

        assert_ne!(&history[0].geohash[..5], prefix);
        let matches = GeoMatcher::new(&matching).find_intersections(&history, &feed);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_bucketed_and_full_scan_agree() {
        let matching = MatchingConfig::default();
        let history = vec![
            sample(32.0, 34.0, 1000, 5000),
            sample(32.0003, 34.0002, 6000, 9000),
            sample(31.5, 34.5, 1000, 9000),
            sample(32.0, 34.0, 20_000, 30_000),
        ];
        let plain = vec![
            report("a", 32.0, 34.0, 2000, 6000),
            report("b", 32.0002, 34.0001, 7000, 8000),
            report("c", 31.5, 34.5, 0, 500),
            report("d", 40.0, 20.0, 0, 50_000),
            report("e", 32.0, 34.0, 25_000, 26_000),
        ];
        let filtered: Vec<SickReport> = plain.iter().cloned().map(|r| with_filter(r, 6)).collect();

        let matcher = GeoMatcher::new(&matching);
        let scan = matcher.find_intersections(&history, &SickFeed { reports: plain });
        let bucketed = matcher.find_intersections(&history, &SickFeed { reports: filtered });

        let key = |m: &MatchedReport| (m.report.source_id.clone(), m.overlap);
        let scan_keys: Vec<_> = scan.iter().map(key).collect();
        let bucket_keys: Vec<_> = bucketed.iter().map(key).collect();
        assert_eq!(scan_keys, bucket_keys);
        assert_eq!(scan_keys.len(), 3);
    }

    #[test]
    fn test_invalid_report_is_skipped_in_bucketed_mode() {
        let matching = MatchingConfig::default();
        let mut bad = report("bad", 32.0, 34.0, 0, 10_000);
        bad.geohash_filter = Some("sv8w".into());
        bad.coordinates.clear();
        let mut garbage = report("garbage", 32.0, 34.0, 0, 10_000);
        garbage.geohash_filter = Some("!!!!".into());
        let good = with_filter(report("good", 32.0, 34.0, 0, 10_000), 4);

        let feed = SickFeed {
            reports: vec![bad, garbage, good],
        };
        let history = vec![sample(32.0, 34.0, 1000, 2000)];
        let matches = GeoMatcher::new(&matching).find_intersections(&history, &feed);
        let ids: Vec<&str> = matches.iter().map(MatchedReport::source_id).collect();
        assert_eq!(ids, vec!["good"]);
    }

    #[test]
    fn test_cluster_history_uses_cluster_threshold() {
        let matching = MatchingConfig {
            intersect_with_clusters: true,
            intersect_millis: 0,
            intersect_millis_with_cluster: 5000,
            ..MatchingConfig::default()
        };
        let cluster = |start, end| ClusterSample {
            latitude: 32.0,
            longitude: 34.0,
            start_time: start,
            end_time: end,
            geohash: "sv8".into(),
            radius: 10.0,
        };
        let feed = SickFeed {
            reports: vec![report("1", 32.0, 34.0, 0, 100_000)],
        };

        let short = vec![cluster(0, 4000)];
        let long = vec![cluster(0, 6000)];
        let matcher = GeoMatcher::new(&matching);
        assert!(matcher.find_intersections(&short, &feed).is_empty());
        assert_eq!(matcher.find_intersections(&long, &feed).len(), 1);
    }
}
