//! Unified error types for the exposure core library.
//!
//! [`ExposureError`] covers every failure mode of a check run. Module-specific
//! errors (such as [`crate::config::ConfigError`]) convert into it so callers
//! only ever handle one type.
//!
//! Throttled checks are not errors: they surface as
//! [`crate::tracker::CheckStatus::Throttled`].
//!
//! # Example
//!
//! ```rust
//! use exposure_core::error::{ExposureError, Result};
//!
//! fn require_payload(body: &str) -> Result<&str> {
//!     if body.is_empty() {
//!         return Err(ExposureError::FeedParse("empty payload".into()));
//!     }
//!     Ok(body)
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;
use tracing::error;

/// The unified error type for all exposure engine operations.
#[derive(Debug, Error)]
pub enum ExposureError {
    // =========================================================================
    // FEED ERRORS
    // =========================================================================
    /// The remote feed could not be downloaded.
    #[error("Failed to fetch exposure feed: {0}")]
    FeedFetch(String),

    /// The feed signature did not validate. Nothing from the payload is trusted.
    #[error("Exposure feed signature verification failed: {0}")]
    FeedVerification(String),

    /// The verified payload is not a valid feed document.
    #[error("Failed to parse exposure feed: {0}")]
    FeedParse(String),

    /// A single feed report is unusable (missing id, coordinates out of range).
    #[error("Invalid sick report '{source_id}': {reason}")]
    InvalidReport {
        /// Identifier of the offending report.
        source_id: String,
        /// What is wrong with it.
        reason: String,
    },

    // =========================================================================
    // PROXIMITY ERRORS
    // =========================================================================
    /// An encounter whose timestamps cannot be normalized to milliseconds.
    #[error("Malformed proximity encounter ({start}..{end}): {reason}")]
    MalformedEncounter {
        /// Raw start timestamp as logged.
        start: i64,
        /// Raw end timestamp as logged.
        end: i64,
        /// Why normalization failed.
        reason: String,
    },

    // =========================================================================
    // STORAGE ERRORS
    // =========================================================================
    /// A store read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The registry does not hold the requested record.
    #[error("Exposure record not found: {0}")]
    RecordNotFound(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // NOTIFICATION ERRORS
    // =========================================================================
    /// The notifier could not deliver the notification.
    #[error("Failed to raise notification: {0}")]
    Notification(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),
}

/// A specialized [`Result`] type for exposure engine operations.
pub type Result<T> = std::result::Result<T, ExposureError>;

impl ExposureError {
    /// Returns `true` if this error came from downloading or verifying the feed.
    #[inline]
    #[must_use]
    pub const fn is_feed_error(&self) -> bool {
        matches!(
            self,
            Self::FeedFetch(_)
                | Self::FeedVerification(_)
                | Self::FeedParse(_)
                | Self::InvalidReport { .. }
        )
    }

    /// Returns `true` if this error is related to persistence.
    #[inline]
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::RecordNotFound(_) | Self::Io(_) | Self::Serialization(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParse(_) | Self::ConfigValidation(_)
        )
    }

    /// Returns `true` if the next periodic run is expected to succeed without
    /// user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FeedFetch(_)
                | Self::FeedVerification(_)
                | Self::MalformedEncounter { .. }
                | Self::Notification(_)
                | Self::Io(_)
        )
    }

    /// Returns a machine-readable error code for logs and API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::FeedFetch(_) => "FEED_FETCH_FAILED",
            Self::FeedVerification(_) => "FEED_VERIFICATION_FAILED",
            Self::FeedParse(_) => "FEED_PARSE_FAILED",
            Self::InvalidReport { .. } => "INVALID_REPORT",
            Self::MalformedEncounter { .. } => "MALFORMED_ENCOUNTER",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::RecordNotFound(_) => "RECORD_NOT_FOUND",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Notification(_) => "NOTIFICATION_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParse(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidation(_) => "CONFIG_VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for ExposureError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParse(e.to_string()),
            ConfigError::WriteError { path, source } => {
                Self::Storage(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::SerializeError(e) => Self::ConfigParse(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidation(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidation(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// CENTRALIZED REPORTING
// =============================================================================

/// Sink for every error a check run catches.
///
/// Runs never propagate failures to the host; they hand them here instead.
pub trait ErrorReporter: Send + Sync {
    /// Record an error that occurred while performing `context`.
    fn report(&self, context: &str, err: &ExposureError);
}

/// Reporter that writes caught errors to the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, context: &str, err: &ExposureError) {
        error!(
            context,
            error_code = err.error_code(),
            recoverable = err.is_recoverable(),
            "{err}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_feed_error_classification() {
        assert!(ExposureError::FeedFetch("timeout".into()).is_feed_error());
        assert!(ExposureError::FeedVerification("bad sig".into()).is_feed_error());
        assert!(ExposureError::FeedParse("eof".into()).is_feed_error());
        assert!(!ExposureError::Storage("disk".into()).is_feed_error());
    }

    #[test]
    fn test_storage_error_classification() {
        assert!(ExposureError::Storage("disk full".into()).is_storage_error());
        assert!(ExposureError::Io(IoErr::new(ErrorKind::NotFound, "x")).is_storage_error());
        assert!(ExposureError::RecordNotFound("abc".into()).is_storage_error());
        assert!(!ExposureError::FeedFetch("x".into()).is_storage_error());
    }

    #[test]
    fn test_verification_failure_is_recoverable() {
        // a bad signature is retried on the next cycle
        assert!(ExposureError::FeedVerification("x".into()).is_recoverable());
        assert!(!ExposureError::ConfigValidation("x".into()).is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ExposureError::FeedVerification("x".into()).error_code(),
            "FEED_VERIFICATION_FAILED"
        );
        assert_eq!(
            ExposureError::MalformedEncounter {
                start: -1,
                end: 0,
                reason: "negative".into()
            }
            .error_code(),
            "MALFORMED_ENCOUNTER"
        );
    }

    #[test]
    fn test_error_display_messages() {
        let err = ExposureError::InvalidReport {
            source_id: "42".into(),
            reason: "no coordinates".into(),
        };
        let text = err.to_string();
        assert!(text.contains("42"));
        assert!(text.contains("no coordinates"));
    }

    #[test]
    fn test_from_serde_error() {
        let err: ExposureError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ExposureError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ExposureError>();
        assert_sync::<ExposureError>();
    }
}
