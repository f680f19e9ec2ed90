//! Exposure check endpoints.
//!
//! A manual run shares the tracker's run lock with the background scheduler,
//! so the two never write the registry at the same time. Throttling still
//! applies to manual runs.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use exposure_core::RunReport;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the checks router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/run", post(run_checks))
        .route("/last", get(last_check))
}

/// The most recent run and the persisted checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LastCheckResponse {
    /// Last run performed by this process, if any.
    #[schema(nullable)]
    pub last_run: Option<RunReport>,

    /// Persisted last-fetch checkpoint, epoch milliseconds.
    #[schema(nullable, example = 1_700_000_000_000_i64)]
    pub checkpoint: Option<i64>,

    /// The checkpoint as an RFC 3339 timestamp.
    #[schema(nullable)]
    pub checkpoint_utc: Option<DateTime<Utc>>,
}

/// Run the proximity and geo checks now.
#[utoipa::path(
    post,
    path = "/api/checks/run",
    tag = "checks",
    operation_id = "runChecks",
    summary = "Run exposure checks",
    description = "Runs the proximity check then the geo check and writes the \
        last-fetch checkpoint. Checks inside their minimum interval report \
        `throttled`. Failures are reported per check, not as an HTTP error.",
    responses(
        (status = 200, description = "Run finished", body = RunReport)
    )
)]
pub async fn run_checks(State(state): State<SharedState>) -> Json<RunReport> {
    Json(state.tracker.run_once().await)
}

/// Get the last run report.
#[utoipa::path(
    get,
    path = "/api/checks/last",
    tag = "checks",
    operation_id = "getLastCheck",
    summary = "Get the last check run",
    description = "Returns the report of the last run in this process and the \
        persisted checkpoint used for throttling.",
    responses(
        (status = 200, description = "Last run retrieved", body = LastCheckResponse),
        (status = 500, description = "Checkpoint store could not be read", body = super::error::ErrorResponse)
    )
)]
pub async fn last_check(State(state): State<SharedState>) -> ApiResult<Json<LastCheckResponse>> {
    let last_run = state.tracker.last_run().await;
    let checkpoint = state.tracker.last_checkpoint().await?;
    let checkpoint_utc = checkpoint.and_then(DateTime::from_timestamp_millis);

    Ok(Json(LastCheckResponse {
        last_run,
        checkpoint,
        checkpoint_utc,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_last_check_serialization() {
        let response = LastCheckResponse {
            last_run: None,
            checkpoint: Some(1_700_000_000_000),
            checkpoint_utc: DateTime::from_timestamp_millis(1_700_000_000_000),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"last_run\":null"));
        assert!(json.contains("2023-11-14T22:13:20Z"));
    }
}
