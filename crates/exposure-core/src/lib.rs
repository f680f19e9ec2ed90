//! # exposure-core
//!
//! Exposure correlation engine: decides whether the user was exposed by
//! correlating their location history and Bluetooth proximity contacts with a
//! signed, remotely published feed of exposure reports.
//!
//! This crate provides:
//! - Geo matching of location history against the feed (full scan or
//!   geohash-bucketed)
//! - Proximity contact normalization and hour-bucket dedup
//! - A merge/dedup state machine keeping one record per exposure across both
//!   evidence kinds
//! - A throttled tracker and periodic scheduler over injected collaborators
//! - JSON file and in-memory persistence, and a signed HTTP feed source
//!
//! ## Architecture
//!
//! - [`types`] - Shared data model
//! - [`geometry`] - Time and space overlap predicates
//! - [`geohash_index`] - Geohash prefix bucketing
//! - [`matcher`] - Geo matcher
//! - [`proximity`] - Proximity encounter normalization
//! - [`merge`] - Merge/dedup engine
//! - [`tracker`] - Throttled checks and run orchestration
//! - [`scheduler`] - Periodic trigger
//! - [`store`] - Collaborator traits
//! - [`registry`] - Registry invariants shared by store backends
//! - [`storage`] / [`memory`] - Store implementations
//! - [`feed`] - Signed feed download and parsing
//! - [`notify`] - Notifications
//! - [`clock`] - Time source
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Unified error types and the error reporter

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod geohash_index;
pub mod geometry;
pub mod matcher;
pub mod memory;
pub mod merge;
pub mod notify;
pub mod proximity;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod types;

// Re-export primary types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    is_valid_signing_key, ConfigError, ConfigResult, EngineConfig, FetchConfig, MatchingConfig,
    NotificationConfig, ProximityConfig, ServerConfig, StorageConfig,
};
pub use error::{ErrorReporter, ExposureError, Result, TracingErrorReporter};
pub use feed::{HttpFeedSource, SignedEnvelope, StaticFeedSource};
pub use geometry::DistanceUnit;
pub use matcher::GeoMatcher;
pub use memory::{MemoryStore, RecordingNotifier};
pub use merge::{MergeEngine, MergeOutcome, MergeTally};
pub use notify::{DurationUnit, Notification, TracingNotifier};
pub use scheduler::Scheduler;
pub use storage::{default_data_dir, FileStorage};
pub use store::{
    CheckpointStore, DismissedStore, FeedSource, HistoryStore, Notifier, ProximityLog,
    RegistryStore, LAST_FETCH_KEY,
};
pub use tracker::{CheckReport, CheckStatus, EngineContext, RunReport, Tracker};
pub use types::{
    ClusterSample, EpochMillis, IntersectionRecord, LocationSample, MatchedReport,
    ProximityEncounter, SickFeed, SickReport, TimeWindow,
};
