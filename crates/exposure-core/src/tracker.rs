//! The exposure tracker: throttled proximity and geo checks over injected
//! collaborators.
//!
//! A run performs the proximity check, then the geo check, then writes the
//! last-fetch checkpoint. Runs are serialized by an internal lock so a manual
//! trigger and the background loop never interleave registry writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, info_span, warn, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{ErrorReporter, ExposureError, Result, TracingErrorReporter};
use crate::matcher::GeoMatcher;
use crate::merge::{MergeEngine, MergeTally};
use crate::notify::Notification;
use crate::proximity::select_latest;
use crate::store::{
    CheckpointStore, DismissedStore, FeedSource, HistoryStore, Notifier, ProximityLog,
    RegistryStore, LAST_FETCH_KEY,
};
use crate::types::{EpochMillis, IntersectionRecord, MatchedReport};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Everything a check needs, passed explicitly.
#[derive(Clone)]
pub struct EngineContext {
    /// Engine configuration.
    pub config: Arc<EngineConfig>,
    /// The user's location history.
    pub history: Arc<dyn HistoryStore>,
    /// The exposure registry.
    pub registry: Arc<dyn RegistryStore>,
    /// Records the user dismissed.
    pub dismissed: Arc<dyn DismissedStore>,
    /// Throttle checkpoints.
    pub checkpoints: Arc<dyn CheckpointStore>,
    /// Exposure feed download.
    pub feed: Arc<dyn FeedSource>,
    /// Bluetooth encounter log.
    pub proximity: Arc<dyn ProximityLog>,
    /// Notification delivery.
    pub notifier: Arc<dyn Notifier>,
    /// Sink for caught errors.
    pub reporter: Arc<dyn ErrorReporter>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl EngineContext {
    /// Build a context where one store backs every persistence trait.
    ///
    /// Errors go to [`TracingErrorReporter`] and time comes from
    /// [`SystemClock`]; use [`Self::with_reporter`] and [`Self::with_clock`]
    /// to replace them.
    pub fn with_store<S>(
        config: EngineConfig,
        store: Arc<S>,
        feed: Arc<dyn FeedSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self
    where
        S: HistoryStore + RegistryStore + DismissedStore + CheckpointStore + ProximityLog + 'static,
    {
        Self {
            config: Arc::new(config),
            history: store.clone(),
            registry: store.clone(),
            dismissed: store.clone(),
            checkpoints: store.clone(),
            proximity: store,
            feed,
            notifier,
            reporter: Arc::new(TracingErrorReporter),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// How a single check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Skipped: the last checkpoint is too recent.
    Throttled,
    /// Skipped: the check is turned off.
    Disabled,
    /// Ran to completion.
    Completed,
    /// Aborted; the error went to the reporter.
    Failed,
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckReport {
    /// How the check ended.
    pub status: CheckStatus,
    /// Merge outcomes produced before the check ended.
    pub tally: MergeTally,
    /// Machine-readable code of the failure, if any.
    pub error_code: Option<String>,
}

impl CheckReport {
    const fn skipped(status: CheckStatus) -> Self {
        Self {
            status,
            tally: MergeTally {
                created: 0,
                merged: 0,
                reflagged: 0,
                duplicates: 0,
            },
            error_code: None,
        }
    }

    fn completed(tally: MergeTally) -> Self {
        Self {
            status: CheckStatus::Completed,
            tally,
            error_code: None,
        }
    }

    fn failed(tally: MergeTally, err: &ExposureError) -> Self {
        Self {
            status: CheckStatus::Failed,
            tally,
            error_code: Some(err.error_code().to_string()),
        }
    }
}

/// Result of one tracker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Proximity check result.
    pub proximity: CheckReport,
    /// Geo check result.
    pub geo: CheckReport,
    /// Checkpoint written at the end of the run, if the write succeeded.
    pub checkpoint: Option<EpochMillis>,
}

/// Runs exposure checks against an [`EngineContext`].
pub struct Tracker {
    ctx: EngineContext,
    run_lock: Mutex<()>,
    last_run: RwLock<Option<RunReport>>,
}

impl Tracker {
    /// Create a tracker.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            run_lock: Mutex::new(()),
            last_run: RwLock::new(None),
        }
    }

    /// The injected collaborators.
    #[must_use]
    pub const fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Run the proximity check, then the geo check, then store the checkpoint.
    ///
    /// Never fails: errors are handed to the reporter and summarized in the
    /// returned [`RunReport`].
    pub async fn run_once(&self) -> RunReport {
        let _guard = self.run_lock.lock().await;
        let started_at = Utc::now();
        let now = self.ctx.clock.now_millis();

        let last_fetch = match self.ctx.checkpoints.get_checkpoint(LAST_FETCH_KEY).await {
            Ok(last) => last.unwrap_or(0),
            Err(err) => {
                self.ctx.reporter.report("reading last fetch checkpoint", &err);
                0
            }
        };

        let proximity = self
            .check_proximity(now, last_fetch)
            .instrument(info_span!("proximity_check"))
            .await;
        let geo = self
            .check_geo(now, last_fetch)
            .instrument(info_span!("geo_check"))
            .await;

        let checkpoint = match self.ctx.checkpoints.set_checkpoint(LAST_FETCH_KEY, now).await {
            Ok(()) => Some(now),
            Err(err) => {
                self.ctx.reporter.report("writing last fetch checkpoint", &err);
                None
            }
        };

        info!(
            proximity = ?proximity.status,
            geo = ?geo.status,
            "exposure check run finished"
        );
        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            proximity,
            geo,
            checkpoint,
        };
        *self.last_run.write().await = Some(report.clone());
        report
    }

    /// The report of the most recent run in this process.
    pub async fn last_run(&self) -> Option<RunReport> {
        self.last_run.read().await.clone()
    }

    /// Check the proximity log for a new contact.
    pub async fn check_proximity(&self, now: EpochMillis, last_fetch: EpochMillis) -> CheckReport {
        if !self.ctx.config.proximity.enabled {
            debug!("proximity checks disabled");
            return CheckReport::skipped(CheckStatus::Disabled);
        }
        if is_throttled(now, last_fetch, self.ctx.config.fetch.min_ble_fetch_interval_mins) {
            debug!(last_fetch, "proximity check throttled");
            return CheckReport::skipped(CheckStatus::Throttled);
        }

        let mut tally = MergeTally::default();
        match self.proximity_pass(&mut tally).await {
            Ok(()) => CheckReport::completed(tally),
            Err(err) => {
                self.ctx.reporter.report("proximity check", &err);
                CheckReport::failed(tally, &err)
            }
        }
    }

    async fn proximity_pass(&self, tally: &mut MergeTally) -> Result<()> {
        let encounters = self.ctx.proximity.collect_recent_encounters().await?;
        if encounters.is_empty() {
            debug!("no proximity encounters");
            return Ok(());
        }

        let selection = select_latest(&encounters);
        for rejected in &selection.rejected {
            self.ctx.reporter.report("normalizing proximity encounter", rejected);
        }
        let Some(contact) = selection.latest else {
            warn!(count = encounters.len(), "no well-formed proximity encounter");
            return Ok(());
        };

        let engine = MergeEngine::new(self.ctx.registry.as_ref(), self.ctx.dismissed.as_ref());
        let outcome = engine.apply_proximity(&contact).await?;
        tally.record(&outcome);

        if outcome.needs_notification() {
            self.notify().await;
        }
        Ok(())
    }

    /// Download the feed and match it against the location history.
    pub async fn check_geo(&self, now: EpochMillis, last_fetch: EpochMillis) -> CheckReport {
        if is_throttled(now, last_fetch, self.ctx.config.fetch.min_geo_fetch_interval_mins) {
            debug!(last_fetch, "geo check throttled");
            return CheckReport::skipped(CheckStatus::Throttled);
        }

        let mut tally = MergeTally::default();
        let result = self.geo_pass(&mut tally).await;

        // Records created before a failure still get their notification.
        if tally.needs_notification() {
            self.notify().await;
        }
        match result {
            Ok(()) => CheckReport::completed(tally),
            Err(err) => {
                self.ctx.reporter.report("geo check", &err);
                CheckReport::failed(tally, &err)
            }
        }
    }

    async fn geo_pass(&self, tally: &mut MergeTally) -> Result<()> {
        let config = &self.ctx.config;
        let feed = self.ctx.feed.fetch_and_verify(&config.fetch.data_url).await?;
        let matcher = GeoMatcher::new(&config.matching);

        let matches: Vec<MatchedReport> = if config.matching.intersect_with_clusters {
            let clusters = self.ctx.history.list_clusters().await?;
            matcher.find_intersections(&clusters, &feed)
        } else {
            let samples = self.ctx.history.list_samples().await?;
            matcher.find_intersections(&samples, &feed)
        };
        info!(
            reports = feed.reports.len(),
            matched = matches.len(),
            "feed matched against history"
        );

        let engine = MergeEngine::new(self.ctx.registry.as_ref(), self.ctx.dismissed.as_ref());
        for matched in &matches {
            let outcome = engine.apply_geo(matched).await?;
            tally.record(&outcome);
        }
        Ok(())
    }

    async fn notify(&self) {
        let notification = Notification::exposure(&self.ctx.config.notification);
        if let Err(err) = self.ctx.notifier.raise(&notification).await {
            self.ctx.reporter.report("raising exposure notification", &err);
        }
    }

    /// Every record, newest exposure window first.
    ///
    /// # Errors
    ///
    /// Propagates registry failures.
    pub async fn list_exposures(&self) -> Result<Vec<IntersectionRecord>> {
        let mut records = self.ctx.registry.list_all_records().await?;
        records.sort_by(|a, b| {
            b.from_time_utc
                .cmp(&a.from_time_utc)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(records)
    }

    /// Mark a record as "I was not there".
    ///
    /// # Errors
    ///
    /// Returns [`ExposureError::RecordNotFound`] for an unknown id, or any
    /// store failure.
    pub async fn dismiss(&self, id: Uuid) -> Result<IntersectionRecord> {
        let _guard = self.run_lock.lock().await;
        if self.ctx.registry.get(id).await?.is_none() {
            return Err(ExposureError::RecordNotFound(id.to_string()));
        }
        let record = self.ctx.registry.set_was_there(id, false).await?;
        self.ctx.dismissed.dismiss(id).await?;
        info!(record_id = %id, "exposure dismissed");
        Ok(record)
    }

    /// Ids of dismissed records.
    ///
    /// # Errors
    ///
    /// Propagates dismissed-set failures.
    pub async fn list_dismissed(&self) -> Result<Vec<Uuid>> {
        self.ctx.dismissed.list_dismissed().await
    }

    /// The stored last-fetch checkpoint.
    ///
    /// # Errors
    ///
    /// Propagates checkpoint store failures.
    pub async fn last_checkpoint(&self) -> Result<Option<EpochMillis>> {
        self.ctx.checkpoints.get_checkpoint(LAST_FETCH_KEY).await
    }
}

/// Whether `now` is still inside the minimum interval after `last_fetch`.
#[must_use]
pub fn is_throttled(now: EpochMillis, last_fetch: EpochMillis, min_interval_mins: u64) -> bool {
    let interval = i64::try_from(min_interval_mins)
        .unwrap_or(i64::MAX)
        .saturating_mul(MILLIS_PER_MINUTE);
    last_fetch.saturating_add(interval) > now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_window() {
        let minute = MILLIS_PER_MINUTE;
        assert!(is_throttled(10 * minute, 0, 15));
        assert!(!is_throttled(15 * minute, 0, 15));
        assert!(!is_throttled(16 * minute, 0, 15));
        assert!(!is_throttled(1, 0, 0));
    }

    #[test]
    fn test_throttle_does_not_overflow() {
        assert!(is_throttled(i64::MAX - 1, i64::MAX - 10, u64::MAX));
    }

    #[test]
    fn test_skipped_report_is_empty() {
        let report = CheckReport::skipped(CheckStatus::Throttled);
        assert_eq!(report.tally, MergeTally::default());
        assert!(report.error_code.is_none());
    }
}
