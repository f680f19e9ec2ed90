//! OpenAPI specification for the exposure-watch API.

use axum::Json;
use exposure_core::{CheckReport, CheckStatus, IntersectionRecord, MergeTally, RunReport};
use utoipa::OpenApi;

use super::checks::LastCheckResponse;
use super::error::ErrorResponse;
use super::exposures::{DismissResponse, ExposureListResponse};
use super::health::HealthResponse;

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty JSON. Used by the gen-openapi binary.
///
/// # Errors
///
/// Fails if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "exposure-watch API",
        version = "0.1.0",
        description = r#"
# exposure-watch API

Runs the exposure correlation engine on a schedule and exposes its registry.

## Overview

1. **Checks**: the proximity check and the geo check run once at start and
   then periodically. Each is skipped while its minimum interval since the
   last checkpoint has not elapsed.
2. **Exposures**: one record per detected exposure. A record carries the feed
   report id, the Bluetooth contact timestamp, or both once corroborated.
3. **Dismissal**: the user can dismiss a record. New evidence for a dismissed
   record flags it again and raises a new notification.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local exposure-watch server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "exposures", description = "Detected exposures and dismissal"),
        (name = "checks", description = "Manual check runs and the last run report")
    ),
    paths(
        super::health::health_check,
        super::exposures::list_exposures,
        super::exposures::dismiss_exposure,
        super::checks::run_checks,
        super::checks::last_check,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            IntersectionRecord,
            ExposureListResponse,
            DismissResponse,
            RunReport,
            CheckReport,
            CheckStatus,
            MergeTally,
            LastCheckResponse,
        )
    )
)]
pub struct ApiDoc;
