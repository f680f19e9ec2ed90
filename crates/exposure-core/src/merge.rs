//! Merge/dedup state machine.
//!
//! Incoming evidence is either a geo match or a proximity contact. Each piece
//! ends up as a duplicate (dropped), a new record, or a merge into the record
//! holding the other modality. When several records could absorb the evidence,
//! the one with the largest time overlap wins, then the earliest.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::Result;
use crate::store::{DismissedStore, RegistryStore};
use crate::types::{ContactInterval, IntersectionRecord, MatchedReport, TimeWindow};

/// What happened to one piece of evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Already represented in the registry.
    Duplicate,
    /// A new record was created.
    Created(IntersectionRecord),
    /// The evidence was attached to an existing record.
    Merged {
        /// The record after the merge.
        record: IntersectionRecord,
        /// The record had been dismissed and is flagged again.
        reflagged: bool,
    },
}

impl MergeOutcome {
    /// Whether the user must be told about this outcome.
    #[must_use]
    pub const fn needs_notification(&self) -> bool {
        matches!(
            self,
            Self::Created(_)
                | Self::Merged {
                    reflagged: true,
                    ..
                }
        )
    }
}

/// Counts of merge outcomes for one check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MergeTally {
    /// New records.
    pub created: usize,
    /// Evidence merged into an existing record.
    pub merged: usize,
    /// Merges that reversed a dismissal.
    pub reflagged: usize,
    /// Evidence already in the registry.
    pub duplicates: usize,
}

impl MergeTally {
    /// Count one outcome.
    pub fn record(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Duplicate => self.duplicates += 1,
            MergeOutcome::Created(_) => self.created += 1,
            MergeOutcome::Merged { reflagged, .. } => {
                self.merged += 1;
                if *reflagged {
                    self.reflagged += 1;
                }
            }
        }
    }

    /// Whether anything in this tally warrants a notification.
    #[must_use]
    pub const fn needs_notification(&self) -> bool {
        self.created > 0 || self.reflagged > 0
    }
}

/// Applies evidence to the registry.
pub struct MergeEngine<'a> {
    registry: &'a dyn RegistryStore,
    dismissed: &'a dyn DismissedStore,
}

impl<'a> MergeEngine<'a> {
    /// Create an engine over the given stores.
    #[must_use]
    pub fn new(registry: &'a dyn RegistryStore, dismissed: &'a dyn DismissedStore) -> Self {
        Self {
            registry,
            dismissed,
        }
    }

    /// Apply a geo match.
    ///
    /// # Errors
    ///
    /// Propagates registry and dismissed-set failures.
    pub async fn apply_geo(&self, matched: &MatchedReport) -> Result<MergeOutcome> {
        let source_id = matched.source_id();
        if self.registry.contains_by_source_id(source_id).await? {
            debug!(source_id, "geo evidence already recorded");
            return Ok(MergeOutcome::Duplicate);
        }

        let records = self.registry.list_all_records().await?;
        let target = best_candidate(
            records.iter().filter(|r| r.is_proximity_only()),
            &matched.overlap,
            |r| r.proximity_bucket(),
        );

        if let Some((existing, ts)) = target.and_then(|r| Some((r, r.proximity_timestamp?))) {
            let was_dismissed = self.was_dismissed(existing).await?;
            let record = self.registry.merge_geo_into_proximity(matched, ts).await?;
            if was_dismissed {
                self.dismissed.restore(record.id).await?;
            }
            info!(
                source_id,
                record_id = %record.id,
                reflagged = was_dismissed,
                "merged geo evidence into proximity record"
            );
            return Ok(MergeOutcome::Merged {
                record,
                reflagged: was_dismissed,
            });
        }

        let record = self.registry.add_from_geo(matched).await?;
        info!(source_id, record_id = %record.id, "new geo exposure");
        Ok(MergeOutcome::Created(record))
    }

    /// Apply a proximity contact.
    ///
    /// # Errors
    ///
    /// Propagates registry and dismissed-set failures.
    pub async fn apply_proximity(&self, contact: &ContactInterval) -> Result<MergeOutcome> {
        let ts = contact.start_ms;
        if self.registry.contains_by_proximity_bucket(ts).await? {
            debug!(bucket_ms = contact.bucket().from_utc, "proximity hour already recorded");
            return Ok(MergeOutcome::Duplicate);
        }

        let records = self.registry.list_all_records().await?;
        let target = best_candidate(
            records.iter().filter(|r| r.is_geo_only()),
            &contact.bucket(),
            |r| Some(r.window()),
        );

        if let Some((existing, source_id)) =
            target.and_then(|r| Some((r, r.source_id.as_deref()?)))
        {
            let was_dismissed = self.was_dismissed(existing).await?;
            let record = self.registry.merge_proximity_into_geo(source_id, ts).await?;
            if was_dismissed {
                self.dismissed.restore(record.id).await?;
            }
            info!(
                source_id,
                record_id = %record.id,
                reflagged = was_dismissed,
                "merged proximity evidence into geo record"
            );
            return Ok(MergeOutcome::Merged {
                record,
                reflagged: was_dismissed,
            });
        }

        let record = self.registry.add_from_proximity(ts).await?;
        info!(record_id = %record.id, bucket_ms = contact.bucket().from_utc, "new proximity exposure");
        Ok(MergeOutcome::Created(record))
    }

    async fn was_dismissed(&self, record: &IntersectionRecord) -> Result<bool> {
        Ok(!record.was_there || self.dismissed.is_dismissed(record.id).await?)
    }
}

/// The record whose window overlaps `window` the most, earliest first on ties.
fn best_candidate<'r>(
    records: impl Iterator<Item = &'r IntersectionRecord>,
    window: &TimeWindow,
    record_window: impl Fn(&IntersectionRecord) -> Option<TimeWindow>,
) -> Option<&'r IntersectionRecord> {
    records
        .filter_map(|r| {
            let overlap = record_window(r)?.overlap_millis(window);
            (overlap > 0).then_some((r, overlap))
        })
        .min_by(|(a, a_overlap), (b, b_overlap)| {
            b_overlap
                .cmp(a_overlap)
                .then_with(|| anchor(a).cmp(&anchor(b)))
        })
        .map(|(r, _)| r)
}

fn anchor(record: &IntersectionRecord) -> i64 {
    record.proximity_timestamp.unwrap_or(record.from_time_utc)
}
