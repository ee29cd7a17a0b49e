use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiResponse, AppError, Result};
use crate::AppState;

/// Signed-URL parameters carried by every blob request
#[derive(Deserialize)]
pub struct BlobQuery {
    pub expires: i64,
    pub signature: String,
}

/// Serve a signed GET minted by the local storage backend
pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<BlobQuery>,
) -> Result<Response> {
    if !state.signer.verify("get", &key, query.expires, &query.signature) {
        return Err(AppError::Forbidden("Invalid or expired signature".to_string()));
    }

    let data = state.storage.download(&key).await?;
    let content_type = mime_guess::from_path(&key).first_or_octet_stream();

    Ok((
        [(header::CONTENT_TYPE, content_type.to_string())],
        data,
    )
        .into_response())
}

/// Accept a signed PUT minted by the local storage backend
pub async fn put_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<BlobQuery>,
    body: Bytes,
) -> Result<Json<ApiResponse<String>>> {
    if !state.signer.verify("put", &key, query.expires, &query.signature) {
        return Err(AppError::Forbidden("Invalid or expired signature".to_string()));
    }

    let content_type = mime_guess::from_path(&key).first_or_octet_stream();
    let result = state
        .storage
        .upload(&key, body, Some(content_type.essence_str()))
        .await?;

    Ok(Json(ApiResponse::success(result.etag)))
}
