//! Periodic trigger for tracker runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::tracker::Tracker;

/// Runs the tracker once at start, then every `period`.
///
/// Each report is kept by the tracker and readable through
/// [`Tracker::last_run`].
pub struct Scheduler {
    tracker: Arc<Tracker>,
    period: Duration,
}

impl Scheduler {
    /// Create a scheduler with the given trigger period.
    #[must_use]
    pub const fn new(tracker: Arc<Tracker>, period: Duration) -> Self {
        Self { tracker, period }
    }

    /// Loop until `cancel` fires. A run in progress finishes before the loop exits.
    pub async fn run(self, cancel: CancellationToken) {
        // interval() rejects a zero period
        let period = self.period.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "exposure scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tracker.run_once().await;
                }
                () = cancel.cancelled() => {
                    info!("exposure scheduler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::{ExposureError, Result};
    use crate::memory::{MemoryStore, RecordingNotifier};
    use crate::store::FeedSource;
    use crate::tracker::EngineContext;
    use crate::types::SickFeed;
    use async_trait::async_trait;

    struct UnreachableFeed;

    #[async_trait]
    impl FeedSource for UnreachableFeed {
        async fn fetch_and_verify(&self, _url: &str) -> Result<SickFeed> {
            Err(ExposureError::FeedFetch("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_runs_immediately_then_stops_on_cancel() {
        let ctx = EngineContext::with_store(
            EngineConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(UnreachableFeed),
            Arc::new(RecordingNotifier::new()),
        );
        let tracker = Arc::new(Tracker::new(ctx));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            Scheduler::new(tracker.clone(), Duration::from_secs(3600)).run(cancel.clone()),
        );

        let mut waited = 0;
        while tracker.last_run().await.is_none() && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        let report = tracker.last_run().await.expect("first run happens at start");
        assert_eq!(report.geo.error_code.as_deref(), Some("FEED_FETCH_FAILED"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
