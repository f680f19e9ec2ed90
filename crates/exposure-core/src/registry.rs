//! Record-set operations shared by every registry backend.
//!
//! [`RecordSet`] holds the registry invariants (one record per `source_id`,
//! one proximity record per hour bucket); backends only decide where the set
//! lives.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExposureError, Result};
use crate::types::{floor_to_hour, EpochMillis, IntersectionRecord, MatchedReport};

/// The registry contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<IntersectionRecord>,
}

impl RecordSet {
    /// Wrap existing records.
    #[must_use]
    pub const fn new(records: Vec<IntersectionRecord>) -> Self {
        Self { records }
    }

    /// All records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[IntersectionRecord] {
        &self.records
    }

    /// Consume into the record list.
    #[must_use]
    pub fn into_records(self) -> Vec<IntersectionRecord> {
        self.records
    }

    /// Whether a record exists for `source_id`.
    #[must_use]
    pub fn contains_source_id(&self, source_id: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.source_id.as_deref() == Some(source_id))
    }

    /// Whether any record's proximity evidence shares `ts`'s hour.
    #[must_use]
    pub fn contains_proximity_bucket(&self, ts: EpochMillis) -> bool {
        let bucket = floor_to_hour(ts);
        self.records
            .iter()
            .filter_map(|r| r.proximity_timestamp)
            .any(|existing| floor_to_hour(existing) == bucket)
    }

    /// A record by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&IntersectionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Insert a geo-origin record.
    ///
    /// # Errors
    ///
    /// Returns [`ExposureError::Storage`] if the `source_id` is already present.
    pub fn add_from_geo(&mut self, matched: &MatchedReport) -> Result<IntersectionRecord> {
        if self.contains_source_id(matched.source_id()) {
            return Err(ExposureError::Storage(format!(
                "record for source '{}' already exists",
                matched.source_id()
            )));
        }
        let record = IntersectionRecord::from_geo(matched);
        self.records.push(record.clone());
        Ok(record)
    }

    /// Insert a proximity-only record.
    ///
    /// # Errors
    ///
    /// Returns [`ExposureError::Storage`] if the hour bucket is already taken.
    pub fn add_from_proximity(&mut self, ts: EpochMillis) -> Result<IntersectionRecord> {
        if self.contains_proximity_bucket(ts) {
            return Err(ExposureError::Storage(format!(
                "proximity record for hour {} already exists",
                floor_to_hour(ts)
            )));
        }
        let record = IntersectionRecord::from_proximity(ts);
        self.records.push(record.clone());
        Ok(record)
    }

    /// Attach proximity evidence to the record for `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExposureError::RecordNotFound`] if no such record exists.
    pub fn merge_proximity_into_geo(
        &mut self,
        source_id: &str,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.source_id.as_deref() == Some(source_id))
            .ok_or_else(|| ExposureError::RecordNotFound(source_id.to_string()))?;
        record.proximity_timestamp = Some(ts);
        record.was_there = true;
        Ok(record.clone())
    }

    /// Attach geo evidence to the proximity-only record logged at `ts`.
    ///
    /// # Errors
    ///
    /// Returns [`ExposureError::RecordNotFound`] if no proximity-only record has
    /// that timestamp, or [`ExposureError::Storage`] if the `source_id` is taken.
    pub fn merge_geo_into_proximity(
        &mut self,
        matched: &MatchedReport,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord> {
        if self.contains_source_id(matched.source_id()) {
            return Err(ExposureError::Storage(format!(
                "record for source '{}' already exists",
                matched.source_id()
            )));
        }
        let record = self
            .records
            .iter_mut()
            .find(|r| r.is_proximity_only() && r.proximity_timestamp == Some(ts))
            .ok_or_else(|| ExposureError::RecordNotFound(format!("proximity record at {ts}")))?;
        record.source_id = Some(matched.source_id().to_string());
        record.from_time_utc = matched.overlap.from_utc;
        record.to_time_utc = matched.overlap.to_utc;
        record.was_there = true;
        Ok(record.clone())
    }

    /// Set the `was_there` flag.
    ///
    /// # Errors
    ///
    /// Returns [`ExposureError::RecordNotFound`] for an unknown id.
    pub fn set_was_there(&mut self, id: Uuid, was_there: bool) -> Result<IntersectionRecord> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ExposureError::RecordNotFound(id.to_string()))?;
        record.was_there = was_there;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SickReport, TimeWindow, HOUR_MILLIS};

    fn matched(id: &str, from: i64, to: i64) -> MatchedReport {
        MatchedReport {
            report: SickReport {
                source_id: id.to_string(),
                from_time_utc: from,
                to_time_utc: to,
                radius: None,
                coordinates: vec![34.0, 32.0],
                geohash_filter: None,
            },
            overlap: TimeWindow::new(from, to),
        }
    }

    #[test]
    fn test_one_record_per_source_id() {
        let mut set = RecordSet::default();
        set.add_from_geo(&matched("a", 0, 10)).unwrap();
        assert!(set.contains_source_id("a"));
        assert!(set.add_from_geo(&matched("a", 0, 10)).is_err());
        assert_eq!(set.records().len(), 1);
    }

    #[test]
    fn test_one_proximity_record_per_hour() {
        let mut set = RecordSet::default();
        set.add_from_proximity(HOUR_MILLIS + 1).unwrap();
        assert!(set.contains_proximity_bucket(HOUR_MILLIS + 59 * 60_000));
        assert!(!set.contains_proximity_bucket(2 * HOUR_MILLIS));
        assert!(set.add_from_proximity(HOUR_MILLIS + 5).is_err());
    }

    #[test]
    fn test_merge_geo_into_proximity_adopts_geo_window() {
        let mut set = RecordSet::default();
        let ts = HOUR_MILLIS + 1000;
        let original = set.add_from_proximity(ts).unwrap();

        let merged = set
            .merge_geo_into_proximity(&matched("a", HOUR_MILLIS, HOUR_MILLIS + 5000), ts)
            .unwrap();

        assert_eq!(merged.id, original.id);
        assert_eq!(merged.source_id.as_deref(), Some("a"));
        assert_eq!(merged.proximity_timestamp, Some(ts));
        assert_eq!(merged.window(), TimeWindow::new(HOUR_MILLIS, HOUR_MILLIS + 5000));
        assert_eq!(set.records().len(), 1);
    }

    #[test]
    fn test_merge_proximity_into_geo_sets_was_there() {
        let mut set = RecordSet::default();
        let record = set.add_from_geo(&matched("a", 0, 10)).unwrap();
        set.set_was_there(record.id, false).unwrap();

        let merged = set.merge_proximity_into_geo("a", 5).unwrap();
        assert!(merged.was_there);
        assert_eq!(merged.proximity_timestamp, Some(5));
    }

    #[test]
    fn test_merge_into_missing_record() {
        let mut set = RecordSet::default();
        assert!(matches!(
            set.merge_proximity_into_geo("nope", 5),
            Err(ExposureError::RecordNotFound(_))
        ));
        assert!(matches!(
            set.merge_geo_into_proximity(&matched("a", 0, 1), 5),
            Err(ExposureError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let mut set = RecordSet::default();
        set.add_from_proximity(0).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.starts_with('['));
    }
}
