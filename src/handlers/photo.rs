use axum::extract::{Json, Path, State};
use serde::Serialize;

use crate::error::{ApiResponse, ApiWarning, AppError, Result};
use crate::models::{
    CompleteCallbackRequest, FailCallbackRequest, PhotoResponse, PhotoStatus, ProcessRequest,
    ProcessResponse, ReprocessRequest, ReprocessResponse, RequestUploadResponse,
    RetouchClaimRequest, RetouchUploadRequest,
};
use crate::services::{DispatchOutcome, DispatchService, PhotoService, UploadService};
use crate::AppState;

/// Whether a state-machine signal found a photo in the expected state
#[derive(Serialize)]
pub struct AppliedResponse {
    pub applied: bool,
}

/// Status observation
pub async fn get_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
) -> Result<Json<ApiResponse<PhotoResponse>>> {
    let photo = PhotoService::get(&state.db, &photo_id).await?;
    Ok(Json(ApiResponse::success(photo.into())))
}

/// Trigger processing once the client reports the bytes are uploaded.
/// Worker unreachability is surfaced as success-with-warning, never as a
/// failure: the photo stays queued and re-dispatchable.
pub async fn process_photo(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ApiResponse<ProcessResponse>>> {
    let photo = PhotoService::get(&state.db, &req.photo_id).await?;

    if let Some(album_id) = &req.album_id {
        if album_id != &photo.album_id {
            return Err(AppError::BadRequest(format!(
                "Photo {} does not belong to album {}",
                photo.id, album_id
            )));
        }
    }
    // A trigger carrying a superseded key predates a retouch delivery
    if let Some(original_key) = &req.original_key {
        if original_key != &photo.original_key {
            return Err(AppError::BadRequest(format!(
                "Stale original key for photo {}",
                photo.id
            )));
        }
    }

    match photo.get_status() {
        Some(PhotoStatus::Pending) | Some(PhotoStatus::Processing) => {}
        Some(PhotoStatus::Failed) => {
            PhotoService::requeue(&state.db, &photo.id).await?;
        }
        _ => {
            return Err(AppError::BadRequest(format!(
                "Photo is not in a dispatchable state: {}",
                photo.status
            )))
        }
    }

    match DispatchService::dispatch(&state.db, &state.worker, &photo).await? {
        DispatchOutcome::Queued => Ok(Json(ApiResponse::success(ProcessResponse {
            success: true,
        }))),
        DispatchOutcome::Degraded(reason) => Ok(Json(ApiResponse::success_with_warning(
            ProcessResponse { success: true },
            ApiWarning {
                code: "WORKER_UNAVAILABLE",
                message: reason,
            },
        ))),
    }
}

/// Batch reprocess by explicit id set or by album
pub async fn reprocess_photos(
    State(state): State<AppState>,
    Json(req): Json<ReprocessRequest>,
) -> Result<Json<ApiResponse<ReprocessResponse>>> {
    let photo_ids =
        DispatchService::resolve_batch(&state.db, &req, state.config.worker.max_batch_size).await?;
    let resp =
        DispatchService::dispatch_many(&state.db, &state.worker, &state.config.worker, photo_ids)
            .await?;
    Ok(Json(ApiResponse::success(resp)))
}

/// Worker callback: derivatives exist
pub async fn worker_complete(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    Json(req): Json<CompleteCallbackRequest>,
) -> Result<Json<ApiResponse<AppliedResponse>>> {
    if req.thumb_key.is_empty() {
        return Err(AppError::BadRequest("thumb_key is required".to_string()));
    }

    let applied = PhotoService::mark_completed(
        &state.db,
        &photo_id,
        &req.thumb_key,
        req.preview_key.as_deref(),
        req.width,
        req.height,
    )
    .await?;

    Ok(Json(ApiResponse::success(AppliedResponse { applied })))
}

/// Worker callback: derivative build failed
pub async fn worker_fail(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    Json(req): Json<FailCallbackRequest>,
) -> Result<Json<ApiResponse<AppliedResponse>>> {
    let applied = PhotoService::mark_failed(&state.db, &photo_id).await?;
    if applied {
        tracing::warn!(
            photo_id = %photo_id,
            reason = %req.reason.as_deref().unwrap_or("unspecified"),
            "Worker reported processing failure"
        );
    }
    Ok(Json(ApiResponse::success(AppliedResponse { applied })))
}

/// Route a pending photo to the retouch queue
pub async fn route_retouch(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
) -> Result<Json<ApiResponse<AppliedResponse>>> {
    PhotoService::get(&state.db, &photo_id).await?;
    let applied = PhotoService::route_to_retoucher(&state.db, &photo_id).await?;
    Ok(Json(ApiResponse::success(AppliedResponse { applied })))
}

/// A retoucher claims a routed photo
pub async fn claim_retouch(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    Json(req): Json<RetouchClaimRequest>,
) -> Result<Json<ApiResponse<AppliedResponse>>> {
    PhotoService::get(&state.db, &photo_id).await?;
    let applied = PhotoService::claim_retouch(&state.db, &photo_id, &req.retoucher_id).await?;
    Ok(Json(ApiResponse::success(AppliedResponse { applied })))
}

/// Issue the retouch delivery credential
pub async fn retouch_upload(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    Json(req): Json<RetouchUploadRequest>,
) -> Result<Json<ApiResponse<RequestUploadResponse>>> {
    let resp = UploadService::request_retouch_upload(
        &state.db,
        state.storage.as_ref(),
        &state.config.upload,
        &photo_id,
        &req.retoucher_id,
    )
    .await?;
    Ok(Json(ApiResponse::success(resp)))
}
