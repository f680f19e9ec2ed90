//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use exposure_core::{
    EngineConfig, EngineContext, FileStorage, HttpFeedSource, Tracker, TracingNotifier,
};
use tracing::info;

/// Shared application state handle.
pub type SharedState = Arc<AppState>;

/// Application state.
pub struct AppState {
    /// Effective engine configuration.
    pub config: Arc<EngineConfig>,
    /// The exposure tracker, shared with the background scheduler.
    pub tracker: Arc<Tracker>,
    started_at: Instant,
}

impl AppState {
    /// Wrap an existing tracker.
    #[must_use]
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self {
            config: tracker.context().config.clone(),
            tracker,
            started_at: Instant::now(),
        }
    }

    /// Build the production collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Fails if a configured signing key is malformed or the HTTP client
    /// cannot be built. An empty key still builds; geo checks then fail
    /// verification on every run.
    pub fn from_config(config: EngineConfig) -> anyhow::Result<Self> {
        let data_dir = config.storage.resolved_data_dir();
        info!(data_dir = %data_dir.display(), "using file storage");

        let storage = Arc::new(FileStorage::new(data_dir));
        let feed = Arc::new(HttpFeedSource::from_config(&config.fetch)?);
        let ctx = EngineContext::with_store(config, storage, feed, Arc::new(TracingNotifier));

        Ok(Self::new(Arc::new(Tracker::new(ctx))))
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
