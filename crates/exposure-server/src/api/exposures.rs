//! Exposure registry endpoints.
//!
//! Lists the detected exposures and lets the user dismiss one ("I was not
//! there"). A dismissed record is flagged again if corroborating evidence
//! arrives later.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use exposure_core::IntersectionRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the exposures router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_exposures))
        .route("/{id}/dismiss", post(dismiss_exposure))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// All exposure records, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExposureListResponse {
    /// Records ordered by exposure window start, newest first.
    pub exposures: Vec<IntersectionRecord>,

    /// Ids the user has dismissed.
    pub dismissed: Vec<Uuid>,

    /// Number of records with `was_there` still set.
    #[schema(example = 1)]
    pub active: usize,
}

/// Response after dismissing an exposure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DismissResponse {
    /// The record after dismissal.
    pub exposure: IntersectionRecord,
}

// ============================================================================
// Handlers
// ============================================================================

/// List exposures.
#[utoipa::path(
    get,
    path = "/api/exposures",
    tag = "exposures",
    operation_id = "listExposures",
    summary = "List detected exposures",
    description = "Returns every exposure record in the registry, newest \
        exposure window first, with the ids the user has dismissed.",
    responses(
        (status = 200, description = "Exposures retrieved", body = ExposureListResponse),
        (status = 500, description = "Registry could not be read", body = super::error::ErrorResponse)
    )
)]
pub async fn list_exposures(
    State(state): State<SharedState>,
) -> ApiResult<Json<ExposureListResponse>> {
    let exposures = state.tracker.list_exposures().await?;
    let dismissed = state.tracker.list_dismissed().await?;
    let active = exposures.iter().filter(|r| r.was_there).count();

    Ok(Json(ExposureListResponse {
        exposures,
        dismissed,
        active,
    }))
}

/// Dismiss an exposure.
#[utoipa::path(
    post,
    path = "/api/exposures/{id}/dismiss",
    tag = "exposures",
    operation_id = "dismissExposure",
    summary = "Dismiss an exposure",
    description = "Marks the exposure as 'I was not there'. The record stays in \
        the registry and is flagged again if new evidence corroborates it.",
    params(
        ("id" = Uuid, Path, description = "Exposure record id")
    ),
    responses(
        (status = 200, description = "Exposure dismissed", body = DismissResponse),
        (status = 404, description = "No such exposure", body = super::error::ErrorResponse)
    )
)]
pub async fn dismiss_exposure(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DismissResponse>> {
    let exposure = state.tracker.dismiss(id).await?;
    Ok(Json(DismissResponse { exposure }))
}
