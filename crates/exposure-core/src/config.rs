//! Engine configuration management.
//!
//! Handles loading, saving, and validating the engine configuration:
//! - Feed location, signing key, and check throttling intervals
//! - Matching thresholds (intersect durations, buffer radius, distance unit)
//! - Proximity and notification settings
//! - Storage and host server settings
//!
//! Configuration is layered with the `config` crate: an optional TOML file,
//! overridden by `EXPOSURE__`-prefixed environment variables
//! (e.g. `EXPOSURE__MATCHING__METER_RADIUS=250`).

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::DistanceUnit;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "EXPOSURE";

/// Errors raised while loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The layered sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// The configuration file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path, e.g. `matching.meter_radius`.
        field: String,
        /// What is wrong with the value.
        message: String,
    },

    /// More than one field failed validation.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Feed download and check throttling.
    pub fetch: FetchConfig,
    /// Geo matching thresholds.
    pub matching: MatchingConfig,
    /// Bluetooth proximity checks.
    pub proximity: ProximityConfig,
    /// Text of the exposure notification.
    pub notification: NotificationConfig,
    /// Local persistence.
    pub storage: StorageConfig,
    /// Host daemon settings.
    pub server: ServerConfig,
}

/// Feed download and check throttling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// URL of the signed exposure feed.
    pub data_url: String,

    /// Base64-encoded ed25519 public key the feed must be signed with.
    pub signing_public_key: String,

    /// Period of the recurring background trigger.
    pub fetch_interval_secs: u64,

    /// Geo checks are skipped if the last checkpoint is younger than this.
    pub min_geo_fetch_interval_mins: u64,

    /// Proximity checks are skipped if the last checkpoint is younger than this.
    pub min_ble_fetch_interval_mins: u64,

    /// Timeout for the feed download.
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            data_url: String::new(),
            signing_public_key: String::new(),
            fetch_interval_secs: 3600,
            min_geo_fetch_interval_mins: 15,
            min_ble_fetch_interval_mins: 15,
            request_timeout_secs: 30,
        }
    }
}

/// Geo matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum time overlap (exclusive) against raw samples.
    pub intersect_millis: i64,

    /// Minimum time overlap (exclusive) against dwell clusters.
    pub intersect_millis_with_cluster: i64,

    /// Radius used for reports that do not carry their own.
    pub meter_radius: f64,

    /// Unit the radius values are expressed in.
    pub buffer_units: DistanceUnit,

    /// Match against dwell clusters instead of raw samples.
    pub intersect_with_clusters: bool,

    /// Index of the latitude inside a report's coordinate array.
    pub sick_geometry_lat_index: usize,

    /// Index of the longitude inside a report's coordinate array.
    pub sick_geometry_long_index: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            intersect_millis: 0,
            intersect_millis_with_cluster: 0,
            meter_radius: 500.0,
            buffer_units: DistanceUnit::Meter,
            intersect_with_clusters: false,
            sick_geometry_lat_index: 1,
            sick_geometry_long_index: 0,
        }
    }
}

impl MatchingConfig {
    /// The minimum overlap duration for the active matching mode.
    #[must_use]
    pub const fn intersect_threshold_millis(&self) -> i64 {
        if self.intersect_with_clusters {
            self.intersect_millis_with_cluster
        } else {
            self.intersect_millis
        }
    }
}

/// Proximity check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Whether proximity checks run at all.
    pub enabled: bool,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Exposure notification text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// How long the notification stays visible.
    pub duration_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Possible exposure detected".to_string(),
            body: "You may have been near a reported exposure. Open the app for details."
                .to_string(),
            duration_ms: 10_000,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the JSON stores. Platform data dir when unset.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// The effective data directory.
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(crate::storage::default_data_dir)
    }
}

/// Host daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the REST API binds to.
    pub bind_addr: String,
    /// Use production logging (JSON file + compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            production: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional TOML file plus environment overrides.
    ///
    /// A missing file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_or_default(path)
    }

    /// Parse configuration from a TOML string without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid configuration.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(content, ::config::FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The default configuration file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "exposure-watch").map_or_else(
            || PathBuf::from("./config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Check every field and collect all violations.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.fetch.fetch_interval_secs == 0 {
            invalid("fetch.fetch_interval_secs", "must be greater than zero");
        }
        if self.fetch.request_timeout_secs == 0 {
            invalid("fetch.request_timeout_secs", "must be greater than zero");
        }
        if !self.fetch.signing_public_key.is_empty()
            && !is_valid_signing_key(&self.fetch.signing_public_key)
        {
            invalid(
                "fetch.signing_public_key",
                "must be a base64-encoded 32-byte ed25519 public key",
            );
        }
        if !self.matching.meter_radius.is_finite() || self.matching.meter_radius < 0.0 {
            invalid("matching.meter_radius", "must be a non-negative number");
        }
        if self.matching.intersect_millis < 0 {
            invalid("matching.intersect_millis", "must not be negative");
        }
        if self.matching.intersect_millis_with_cluster < 0 {
            invalid("matching.intersect_millis_with_cluster", "must not be negative");
        }
        if self.matching.sick_geometry_lat_index == self.matching.sick_geometry_long_index {
            invalid(
                "matching.sick_geometry_long_index",
                "latitude and longitude indices must differ",
            );
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Returns `true` if `key` decodes to a usable ed25519 verifying key.
#[must_use]
pub fn is_valid_signing_key(key: &str) -> bool {
    BASE64
        .decode(key.trim())
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
        .is_some_and(|bytes| ed25519_dalek::VerifyingKey::from_bytes(&bytes).is_ok())
}
