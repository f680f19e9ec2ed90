//! Persistent storage backed by JSON files.
//!
//! Each store lives in its own file under the data directory. Missing files
//! read as empty. Writes go to a temporary sibling first and are renamed into
//! place, so a crash mid-write never leaves a truncated file behind.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ExposureError, Result};
use crate::registry::RecordSet;
use crate::store::{
    CheckpointStore, DismissedStore, HistoryStore, ProximityLog, RegistryStore,
};
use crate::types::{
    ClusterSample, EpochMillis, IntersectionRecord, LocationSample, MatchedReport,
    ProximityEncounter,
};

const LOCATIONS_FILE: &str = "locations.json";
const CLUSTERS_FILE: &str = "clusters.json";
const EXPOSURES_FILE: &str = "exposures.json";
const ENCOUNTERS_FILE: &str = "encounters.json";
const CHECKPOINTS_FILE: &str = "checkpoints.json";
const DISMISSED_FILE: &str = "dismissed.json";

/// The platform data directory.
///
/// On Linux: `/var/lib/exposure-watch`.
/// Elsewhere: the user data dir (e.g. `~/Library/Application Support/exposure-watch`).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/exposure-watch")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "exposure-watch").map_or_else(
            || PathBuf::from("exposure-watch"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
    }
}

/// Storage backend for every persistence trait.
#[derive(Debug)]
pub struct FileStorage {
    data_dir: PathBuf,
    // Serializes read-modify-write cycles across tasks.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a new storage instance rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The directory holding the JSON files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Replace the stored location history.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_samples(&self, samples: &[LocationSample]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(LOCATIONS_FILE, &samples).await
    }

    /// Replace the stored cluster history.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_clusters(&self, clusters: &[ClusterSample]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(CLUSTERS_FILE, &clusters).await
    }

    /// Replace the logged proximity encounters.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_encounters(&self, encounters: &[ProximityEncounter]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(ENCOUNTERS_FILE, &encounters).await
    }

    fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    async fn read_json<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(name);
        match tokio::fs::read(&path).await {
            Ok(content) => serde_json::from_slice(&content).map_err(|e| {
                ExposureError::Storage(format!("corrupt store {}: {e}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_json<T>(&self, name: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "store written");
        Ok(())
    }

    async fn update_records<F>(&self, f: F) -> Result<IntersectionRecord>
    where
        F: FnOnce(&mut RecordSet) -> Result<IntersectionRecord> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records: RecordSet = self.read_json(EXPOSURES_FILE).await?;
        let record = f(&mut records)?;
        self.write_json(EXPOSURES_FILE, &records).await?;
        Ok(record)
    }

    async fn records(&self) -> Result<RecordSet> {
        self.read_json(EXPOSURES_FILE).await
    }
}

#[async_trait]
impl HistoryStore for FileStorage {
    async fn list_samples(&self) -> Result<Vec<LocationSample>> {
        self.read_json(LOCATIONS_FILE).await
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterSample>> {
        self.read_json(CLUSTERS_FILE).await
    }
}

#[async_trait]
impl RegistryStore for FileStorage {
    async fn contains_by_source_id(&self, source_id: &str) -> Result<bool> {
        Ok(self.records().await?.contains_source_id(source_id))
    }

    async fn contains_by_proximity_bucket(&self, ts: EpochMillis) -> Result<bool> {
        Ok(self.records().await?.contains_proximity_bucket(ts))
    }

    async fn list_all_records(&self) -> Result<Vec<IntersectionRecord>> {
        Ok(self.records().await?.into_records())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IntersectionRecord>> {
        Ok(self.records().await?.get(id).cloned())
    }

    async fn add_from_geo(&self, matched: &MatchedReport) -> Result<IntersectionRecord> {
        self.update_records(|set| set.add_from_geo(matched)).await
    }

    async fn add_from_proximity(&self, ts: EpochMillis) -> Result<IntersectionRecord> {
        self.update_records(|set| set.add_from_proximity(ts)).await
    }

    async fn merge_proximity_into_geo(
        &self,
        source_id: &str,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord> {
        self.update_records(|set| set.merge_proximity_into_geo(source_id, ts))
            .await
    }

    async fn merge_geo_into_proximity(
        &self,
        matched: &MatchedReport,
        ts: EpochMillis,
    ) -> Result<IntersectionRecord> {
        self.update_records(|set| set.merge_geo_into_proximity(matched, ts))
            .await
    }

    async fn set_was_there(&self, id: Uuid, was_there: bool) -> Result<IntersectionRecord> {
        self.update_records(|set| set.set_was_there(id, was_there))
            .await
    }
}

#[async_trait]
impl DismissedStore for FileStorage {
    async fn is_dismissed(&self, id: Uuid) -> Result<bool> {
        let dismissed: BTreeSet<Uuid> = self.read_json(DISMISSED_FILE).await?;
        Ok(dismissed.contains(&id))
    }

    async fn dismiss(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut dismissed: BTreeSet<Uuid> = self.read_json(DISMISSED_FILE).await?;
        if dismissed.insert(id) {
            self.write_json(DISMISSED_FILE, &dismissed).await?;
        }
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut dismissed: BTreeSet<Uuid> = self.read_json(DISMISSED_FILE).await?;
        let removed = dismissed.remove(&id);
        if removed {
            self.write_json(DISMISSED_FILE, &dismissed).await?;
        }
        Ok(removed)
    }

    async fn list_dismissed(&self) -> Result<Vec<Uuid>> {
        let dismissed: BTreeSet<Uuid> = self.read_json(DISMISSED_FILE).await?;
        Ok(dismissed.into_iter().collect())
    }
}

#[async_trait]
impl CheckpointStore for FileStorage {
    async fn get_checkpoint(&self, key: &str) -> Result<Option<EpochMillis>> {
        let checkpoints: HashMap<String, EpochMillis> = self.read_json(CHECKPOINTS_FILE).await?;
        Ok(checkpoints.get(key).copied())
    }

    async fn set_checkpoint(&self, key: &str, ts: EpochMillis) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut checkpoints: HashMap<String, EpochMillis> =
            self.read_json(CHECKPOINTS_FILE).await?;
        checkpoints.insert(key.to_string(), ts);
        self.write_json(CHECKPOINTS_FILE, &checkpoints).await
    }
}

#[async_trait]
impl ProximityLog for FileStorage {
    async fn collect_recent_encounters(&self) -> Result<Vec<ProximityEncounter>> {
        self.read_json(ENCOUNTERS_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LAST_FETCH_KEY;
    use crate::types::{SickReport, TimeWindow};
    use tempfile::TempDir;

    fn matched(id: &str) -> MatchedReport {
        MatchedReport {
            report: SickReport {
                source_id: id.to_string(),
                from_time_utc: 100,
                to_time_utc: 900,
                radius: None,
                coordinates: vec![34.0, 32.0],
                geohash_filter: None,
            },
            overlap: TimeWindow::new(200, 800),
        }
    }

    #[tokio::test]
    async fn test_missing_files_read_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.list_samples().await.unwrap().is_empty());
        assert!(storage.list_all_records().await.unwrap().is_empty());
        assert!(storage.list_dismissed().await.unwrap().is_empty());
        assert_eq!(storage.get_checkpoint(LAST_FETCH_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_records_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let record = FileStorage::new(dir.path())
            .add_from_geo(&matched("r1"))
            .await
            .unwrap();

        let reopened = FileStorage::new(dir.path());
        assert!(reopened.contains_by_source_id("r1").await.unwrap());
        let loaded = reopened.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.window(), TimeWindow::new(200, 800));
        assert!(!dir.path().join("exposures.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_checkpoint_survives_restart() {
        let dir = TempDir::new().unwrap();
        FileStorage::new(dir.path())
            .set_checkpoint(LAST_FETCH_KEY, 1234)
            .await
            .unwrap();
        let reopened = FileStorage::new(dir.path());
        assert_eq!(
            reopened.get_checkpoint(LAST_FETCH_KEY).await.unwrap(),
            Some(1234)
        );
    }

    #[tokio::test]
    async fn test_history_and_encounters_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(LOCATIONS_FILE),
            r#"[{"lat": 32.0, "long": 34.0, "startTime": 1000, "endTime": 5000, "geoHash": "sv8wrq"}]"#,
        )
        .unwrap();
        let storage = FileStorage::new(dir.path());
        storage
            .save_encounters(&[ProximityEncounter {
                start_contact_timestamp: 1000,
                end_contact_timestamp: 1100,
            }])
            .await
            .unwrap();

        let samples = storage.list_samples().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].start_time, 1000);
        assert_eq!(storage.collect_recent_encounters().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(EXPOSURES_FILE), "{not json").unwrap();
        let storage = FileStorage::new(dir.path());
        let err = storage.list_all_records().await.unwrap_err();
        assert!(err.is_storage_error());
    }

    #[tokio::test]
    async fn test_dismiss_and_restore() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let id = Uuid::new_v4();
        storage.dismiss(id).await.unwrap();
        assert!(FileStorage::new(dir.path()).is_dismissed(id).await.unwrap());
        assert!(storage.restore(id).await.unwrap());
        assert!(!storage.is_dismissed(id).await.unwrap());
    }
}
