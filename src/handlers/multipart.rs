use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};

use crate::error::{ApiResponse, Result};
use crate::services::MultipartService;
use crate::storage::PartEtag;
use crate::AppState;

#[derive(Deserialize)]
pub struct InitMultipartRequest {
    pub album_id: String,
    pub filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub hash: Option<String>,
}

#[derive(Serialize)]
pub struct InitMultipartResponse {
    pub photo_id: String,
    pub upload_id: String,
    pub key: String,
    pub part_size: u64,
}

#[derive(Deserialize)]
pub struct SignPartRequest {
    pub key: String,
    pub upload_id: String,
    pub part_number: i32,
}

#[derive(Serialize)]
pub struct SignPartResponse {
    pub url: String,
}

#[derive(Deserialize)]
pub struct PartInfo {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Deserialize)]
pub struct CompleteMultipartRequest {
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<PartInfo>,
}

#[derive(Deserialize)]
pub struct AbortMultipartRequest {
    pub photo_id: String,
    pub key: String,
    pub upload_id: String,
}

pub async fn init_multipart(
    State(state): State<AppState>,
    Json(req): Json<InitMultipartRequest>,
) -> Result<Json<ApiResponse<InitMultipartResponse>>> {
    let initiated = MultipartService::init(
        &state.db,
        state.storage.as_ref(),
        &state.config.upload,
        &req.album_id,
        &req.filename,
        &req.content_type,
        req.file_size,
        req.hash.as_deref(),
    )
    .await?;

    Ok(Json(ApiResponse::success(InitMultipartResponse {
        photo_id: initiated.photo_id,
        upload_id: initiated.upload_id,
        key: initiated.key,
        part_size: initiated.part_size,
    })))
}

pub async fn sign_part(
    State(state): State<AppState>,
    Json(req): Json<SignPartRequest>,
) -> Result<Json<ApiResponse<SignPartResponse>>> {
    let url = MultipartService::sign_part(
        state.storage.as_ref(),
        &state.config.upload,
        &req.key,
        &req.upload_id,
        req.part_number,
    )
    .await?;

    Ok(Json(ApiResponse::success(SignPartResponse { url })))
}

pub async fn complete_multipart(
    State(state): State<AppState>,
    Json(req): Json<CompleteMultipartRequest>,
) -> Result<Json<ApiResponse<()>>> {
    let parts: Vec<PartEtag> = req
        .parts
        .into_iter()
        .map(|p| PartEtag {
            part_number: p.part_number,
            etag: p.etag,
        })
        .collect();

    MultipartService::complete(state.storage.as_ref(), &req.key, &req.upload_id, parts).await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn abort_multipart(
    State(state): State<AppState>,
    Json(req): Json<AbortMultipartRequest>,
) -> Result<Json<ApiResponse<()>>> {
    MultipartService::abort(
        &state.db,
        state.storage.as_ref(),
        &req.photo_id,
        &req.key,
        &req.upload_id,
    )
    .await?;
    Ok(Json(ApiResponse::success(())))
}
