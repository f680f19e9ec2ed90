//! In-memory collaborators for embedding and tests.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ExposureError, Result};
use crate::notify::Notification;
use crate::registry::RecordSet;
use crate::store::{
    CheckpointStore, DismissedStore, HistoryStore, Notifier, ProximityLog, RegistryStore,
};
use crate::types::{
    ClusterSample, EpochMillis, IntersectionRecord, LocationSample, MatchedReport,
    ProximityEncounter,
};

#[derive(Debug, Default)]
struct MemoryState {
    samples: Vec<LocationSample>,
    clusters: Vec<ClusterSample>,
    encounters: Vec<ProximityEncounter>,
    records: RecordSet,
    dismissed: BTreeSet<Uuid>,
    checkpoints: HashMap<String, EpochMillis>,
}

/// Every persistence trait backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the raw location history.
    pub async fn set_samples(&self, samples: Vec<LocationSample>) {
        self.state.lock().await.samples = samples;
    }

    /// Replace the cluster history.
    pub async fn set_clusters(&self, clusters: Vec<ClusterSample>) {
        self.state.lock().await.clusters = clusters;
    }

    /// Replace the logged proximity encounters.
    pub async fn set_encounters(&self, encounters: Vec<ProximityEncounter>) {
        self.state.lock().await.encounters = encounters;
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn list_samples(&self) -> Result<Vec<LocationSample>> {
        Ok(self.state.lock().await.samples.clone())
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterSample>> {
        Ok(self.state.lock().await.clusters.clone())
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn contains_by_source_id(&self, source_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.records.contains_source_id(source_id))
    }

    async fn contains_by_proximity_bucket(&self, ts: EpochMillis) -> Result<bool> {
        Ok(self.state.lock().await.records.contains_proximity_bucket(ts))
    }

    async fn list_all_records(&self) -> Result<Vec<IntersectionRecord>> {
        Ok(self.state.lock().await.records.records().to_vec())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IntersectionRecord>> {
        Ok(self.state.lock().await.records.get(id).cloned())
    }

    async fn add_from_geo(&self, matched: &MatchedReport) -> Result<IntersectionRecord> {
        self.state.lock().await.records.add_from_geo(matched)
    }

    async fn add_from_proximity(&self, ts: EpochMillis) -> Result<IntersectionRecord> {
        self.state.lock().await.records.add_from_proximity(ts)
    }

    async fn merge_proximity_into_geo(
        &self,
        source_id: &str,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord> {
        self.state
            .lock()
            .await
            .records
            .merge_proximity_into_geo(source_id, ts)
    }

    async fn merge_geo_into_proximity(
        &self,
        matched: &MatchedReport,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord> {
        self.state
            .lock()
            .await
            .records
            .merge_geo_into_proximity(matched, ts)
    }

    async fn set_was_there(&self, id: Uuid, was_there: bool) -> Result<IntersectionRecord> {
        self.state.lock().await.records.set_was_there(id, was_there)
    }
}

#[async_trait]
impl DismissedStore for MemoryStore {
    async fn is_dismissed(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.dismissed.contains(&id))
    }

    async fn dismiss(&self, id: Uuid) -> Result<()> {
        self.state.lock().await.dismissed.insert(id);
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.dismissed.remove(&id))
    }

    async fn list_dismissed(&self) -> Result<Vec<Uuid>> {
        Ok(self.state.lock().await.dismissed.iter().copied().collect())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get_checkpoint(&self, key: &str) -> Result<Option<EpochMillis>> {
        Ok(self.state.lock().await.checkpoints.get(key).copied())
    }

    async fn set_checkpoint(&self, key: &str, ts: EpochMillis) -> Result<()> {
        self.state
            .lock()
            .await
            .checkpoints
            .insert(key.to_string(), ts);
        Ok(())
    }
}

#[async_trait]
impl ProximityLog for MemoryStore {
    async fn collect_recent_encounters(&self) -> Result<Vec<ProximityEncounter>> {
        Ok(self.state.lock().await.encounters.clone())
    }
}

/// Notifier that keeps every notification it is asked to raise.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    raised: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier that records and succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            raised: Mutex::default(),
            fail: true,
        }
    }

    /// Notifications raised so far (including failed deliveries).
    pub async fn raised(&self) -> Vec<Notification> {
        self.raised.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn raise(&self, notification: &Notification) -> Result<()> {
        self.raised.lock().await.push(notification.clone());
        if self.fail {
            return Err(ExposureError::Notification("delivery refused".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoints_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_checkpoint("k").await.unwrap(), None);
        store.set_checkpoint("k", 42).await.unwrap();
        assert_eq!(store.get_checkpoint("k").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_dismissed_set() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.dismiss(id).await.unwrap();
        assert!(store.is_dismissed(id).await.unwrap());
        assert!(store.restore(id).await.unwrap());
        assert!(!store.restore(id).await.unwrap());
        assert!(store.list_dismissed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_notifier_still_records() {
        let notifier = RecordingNotifier::failing();
        let n = Notification::exposure(&crate::config::NotificationConfig::default());
        assert!(notifier.raise(&n).await.is_err());
        assert_eq!(notifier.raised().await.len(), 1);
    }
}
