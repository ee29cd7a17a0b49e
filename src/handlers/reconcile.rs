use axum::extract::{Json, State};

use crate::error::{ApiResponse, Result};
use crate::services::reconcile::{ReconcileOptions, ReconcileReport, ReconcileService};
use crate::AppState;

/// Run a consistency check between the photos table and object storage.
/// Report-only unless auto_fix is set; deletions need double opt-in.
pub async fn consistency_check(
    State(state): State<AppState>,
    Json(opts): Json<ReconcileOptions>,
) -> Result<Json<ApiResponse<ReconcileReport>>> {
    let report = ReconcileService::check(
        &state.db,
        state.storage.as_ref(),
        state.config.upload.pending_grace_secs,
        &opts,
    )
    .await?;

    Ok(Json(ApiResponse::success(report)))
}
