//! Tracker runs persisted through `FileStorage`, surviving a restart.

use std::sync::Arc;

use exposure_core::{
    CheckStatus, EngineConfig, EngineContext, FileStorage, LocationSample, ManualClock,
    ProximityEncounter, RecordingNotifier, RegistryStore, SickFeed, SickReport, StaticFeedSource,
    Tracker,
};
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000_000;

fn tracker(dir: &TempDir, now: i64) -> (Tracker, Arc<FileStorage>) {
    let storage = Arc::new(FileStorage::new(dir.path()));
    let feed = StaticFeedSource::new(SickFeed {
        reports: vec![SickReport {
            source_id: "1473".into(),
            from_time_utc: 2000,
            to_time_utc: 6000,
            radius: Some(50.0),
            coordinates: vec![34.0, 32.0],
            geohash_filter: Some("sv8wr".into()),
        }],
    });
    let ctx = EngineContext::with_store(
        EngineConfig::default(),
        storage.clone(),
        Arc::new(feed),
        Arc::new(RecordingNotifier::new()),
    )
    .with_clock(Arc::new(ManualClock::new(now)));
    (Tracker::new(ctx), storage)
}

#[tokio::test]
async fn registry_and_checkpoint_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let (_, storage) = tracker(&dir, NOW);
        storage
            .save_samples(&[LocationSample {
                latitude: 32.0,
                longitude: 34.0,
                start_time: 1000,
                end_time: 5000,
                geohash: "'sv8wrqx".into(),
            }])
            .await
            .unwrap();
        storage
            .save_encounters(&[ProximityEncounter {
                start_contact_timestamp: 1000,
                end_contact_timestamp: 1060,
            }])
            .await
            .unwrap();
    }

    let (first, _) = tracker(&dir, NOW);
    let run = first.run_once().await;
    assert_eq!(run.geo.tally.created, 1);
    assert_eq!(run.proximity.tally.created, 1);

    // Restarted within the throttle window: the persisted checkpoint applies.
    let (restarted, _) = tracker(&dir, NOW + 60_000);
    let run = restarted.run_once().await;
    assert_eq!(run.geo.status, CheckStatus::Throttled);
    assert_eq!(run.proximity.status, CheckStatus::Throttled);

    // Later run sees only duplicates.
    let (later, storage) = tracker(&dir, NOW + 3_600_000);
    let run = later.run_once().await;
    assert_eq!(run.geo.tally.duplicates, 1);
    assert_eq!(run.proximity.tally.duplicates, 1);
    assert_eq!(storage.list_all_records().await.unwrap().len(), 2);
}
