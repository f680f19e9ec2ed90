//! Collaborator interfaces consumed by the engine.
//!
//! The engine never reaches for a global handle: every check receives these
//! through [`crate::tracker::EngineContext`]. [`crate::storage::FileStorage`]
//! and [`crate::memory::MemoryStore`] implement the persistence traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::notify::Notification;
use crate::types::{
    ClusterSample, EpochMillis, IntersectionRecord, LocationSample, MatchedReport,
    ProximityEncounter, SickFeed,
};

/// Checkpoint key for the last completed run.
pub const LAST_FETCH_KEY: &str = "last_fetch_ts";

/// The user's own location history. Order is not guaranteed.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Raw location samples.
    async fn list_samples(&self) -> Result<Vec<LocationSample>>;

    /// Aggregated dwell clusters.
    async fn list_clusters(&self) -> Result<Vec<ClusterSample>>;
}

/// The canonical exposure registry.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Whether a record exists for the given feed report id.
    async fn contains_by_source_id(&self, source_id: &str) -> Result<bool>;

    /// Whether a record carries proximity evidence in the same hour as `ts`.
    async fn contains_by_proximity_bucket(&self, ts: EpochMillis) -> Result<bool>;

    /// Every record, in insertion order.
    async fn list_all_records(&self) -> Result<Vec<IntersectionRecord>>;

    /// A single record by id.
    async fn get(&self, id: Uuid) -> Result<Option<IntersectionRecord>>;

    /// Create a geo-origin record.
    async fn add_from_geo(&self, matched: &MatchedReport) -> Result<IntersectionRecord>;

    /// Create a proximity-only record.
    async fn add_from_proximity(&self, ts: EpochMillis) -> Result<IntersectionRecord>;

    /// Attach proximity evidence to the record for `source_id`.
    async fn merge_proximity_into_geo(
        &self,
        source_id: &str,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord>;

    /// Attach geo evidence to the proximity-only record logged at `ts`.
    async fn merge_geo_into_proximity(
        &self,
        matched: &MatchedReport,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord>;

    /// Record whether the user confirms having been there.
    async fn set_was_there(&self, id: Uuid, was_there: bool) -> Result<IntersectionRecord>;
}

/// Records the user has dismissed ("I was not there").
#[async_trait]
pub trait DismissedStore: Send + Sync {
    /// Whether `id` is currently dismissed.
    async fn is_dismissed(&self, id: Uuid) -> Result<bool>;

    /// Add `id` to the dismissed set.
    async fn dismiss(&self, id: Uuid) -> Result<()>;

    /// Remove `id` from the dismissed set. Returns whether it was present.
    async fn restore(&self, id: Uuid) -> Result<bool>;

    /// All dismissed ids.
    async fn list_dismissed(&self) -> Result<Vec<Uuid>>;
}

/// Persisted timestamps surviving process restarts.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored timestamp, if any.
    async fn get_checkpoint(&self, key: &str) -> Result<Option<EpochMillis>>;

    /// Store a timestamp.
    async fn set_checkpoint(&self, key: &str, ts: EpochMillis) -> Result<()>;
}

/// Downloads the exposure feed and verifies its signature.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the feed at `url`. Fails without returning any report if the
    /// signature does not validate.
    async fn fetch_and_verify(&self, url: &str) -> Result<SickFeed>;
}

/// The Bluetooth proximity logging subsystem.
#[async_trait]
pub trait ProximityLog: Send + Sync {
    /// Encounters logged since the subsystem last matched.
    async fn collect_recent_encounters(&self) -> Result<Vec<ProximityEncounter>>;
}

/// Local notification delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a notification to the user.
    async fn raise(&self, notification: &Notification) -> Result<()>;
}
