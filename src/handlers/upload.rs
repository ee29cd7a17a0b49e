use axum::extract::{Json, Path, State};

use crate::error::{ApiResponse, Result};
use crate::models::{RequestUploadRequest, RequestUploadResponse};
use crate::services::UploadService;
use crate::AppState;

/// Issue a presigned upload credential for a new photo
pub async fn request_upload(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    Json(req): Json<RequestUploadRequest>,
) -> Result<Json<ApiResponse<RequestUploadResponse>>> {
    let resp = UploadService::request_upload(
        &state.db,
        state.storage.as_ref(),
        &state.config.upload,
        &album_id,
        req,
    )
    .await?;

    Ok(Json(ApiResponse::success(resp)))
}
