//! API error types and response handling.
//!
//! Engine errors are mapped onto HTTP statuses here so handlers can use `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use exposure_core::ExposureError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 404 Not Found - the record does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - storage or configuration failure.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - the feed or notifier could not be reached.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "record_not_found",
    "message": "Exposure record not found: 0192d1f6-3f9a-7c4e-9a61-2b1c8d4e5f60",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "record_not_found")]
    pub error: String,

    /// Human-readable error message.
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    const fn message(&self) -> &String {
        match self {
            Self::NotFound { message, .. }
            | Self::InternalError { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::NotFound {
                error_code,
                message,
            }
            | Self::ServiceUnavailable {
                error_code,
                message,
            } => {
                tracing::warn!(%error_code, %message, status = status.as_u16(), "request failed");
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                }
            }
            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(%error_code, %message, ?details, "request failed");
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(serde_json::Value::String),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<ExposureError> for ApiError {
    fn from(err: ExposureError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        match err {
            ExposureError::RecordNotFound(_) => Self::NotFound {
                error_code,
                message,
            },
            ExposureError::FeedFetch(_)
            | ExposureError::FeedVerification(_)
            | ExposureError::FeedParse(_)
            | ExposureError::Notification(_) => Self::ServiceUnavailable {
                error_code,
                message,
            },
            ExposureError::Storage(_)
            | ExposureError::Io(_)
            | ExposureError::Serialization(_)
            | ExposureError::InvalidReport { .. }
            | ExposureError::MalformedEncounter { .. }
            | ExposureError::ConfigNotFound(_)
            | ExposureError::ConfigParse(_)
            | ExposureError::ConfigValidation(_) => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_not_found_maps_to_404() {
        let err = ApiError::from(ExposureError::RecordNotFound("abc".into()));
        assert!(matches!(&err, ApiError::NotFound { error_code, .. } if error_code == "record_not_found"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_feed_errors_map_to_503() {
        let err = ApiError::from(ExposureError::FeedVerification("bad".into()));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_storage_errors_map_to_500() {
        let err = ApiError::from(ExposureError::Storage("disk full".into()));
        assert!(err.to_string().starts_with("500 Internal Server Error: "));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }
}
