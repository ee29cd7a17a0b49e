use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a photo record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoStatus {
    Pending,
    PendingRetouch,
    Retouching,
    Processing,
    Completed,
    Failed,
}

impl PhotoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStatus::Pending => "pending",
            PhotoStatus::PendingRetouch => "pending_retouch",
            PhotoStatus::Retouching => "retouching",
            PhotoStatus::Processing => "processing",
            PhotoStatus::Completed => "completed",
            PhotoStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PhotoStatus::Pending),
            "pending_retouch" => Some(PhotoStatus::PendingRetouch),
            "retouching" => Some(PhotoStatus::Retouching),
            "processing" => Some(PhotoStatus::Processing),
            "completed" => Some(PhotoStatus::Completed),
            "failed" => Some(PhotoStatus::Failed),
            _ => None,
        }
    }
}

/// Photo model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Photo {
    pub id: String,
    pub album_id: String,
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub content_hash: Option<String>,
    pub original_key: String,
    pub preview_key: Option<String>,
    pub thumb_key: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub status: String,
    pub retoucher_id: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Photo {
    pub fn get_status(&self) -> Option<PhotoStatus> {
        PhotoStatus::from_str(&self.status)
    }
}

/// Upload credential request
#[derive(Debug, Deserialize)]
pub struct RequestUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub hash: Option<String>,
}

/// Upload credential response
#[derive(Debug, Serialize)]
pub struct RequestUploadResponse {
    pub photo_id: String,
    pub upload_url: String,
    pub original_key: String,
    pub album_id: String,
}

/// Photo response for status observation
#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub id: String,
    pub album_id: String,
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub status: String,
    pub original_key: String,
    pub preview_key: Option<String>,
    pub thumb_key: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub retoucher_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Photo> for PhotoResponse {
    fn from(photo: Photo) -> Self {
        Self {
            id: photo.id,
            album_id: photo.album_id,
            filename: photo.filename,
            size: photo.size,
            mime_type: photo.mime_type,
            status: photo.status,
            original_key: photo.original_key,
            preview_key: photo.preview_key,
            thumb_key: photo.thumb_key,
            width: photo.width,
            height: photo.height,
            retoucher_id: photo.retoucher_id,
            created_at: photo.created_at,
            updated_at: photo.updated_at,
        }
    }
}

/// Process-trigger request. The stored row is authoritative; the optional
/// key lets the caller detect a stale trigger issued before a retouch
/// delivery swapped the original.
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub photo_id: String,
    pub album_id: Option<String>,
    pub original_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
}

/// Batch reprocess request: either an explicit id set or a whole album
#[derive(Debug, Deserialize)]
pub struct ReprocessRequest {
    pub photo_ids: Option<Vec<String>>,
    pub album_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReprocessError {
    pub photo_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub queued: usize,
    pub total: usize,
    pub failed: usize,
    pub errors: Vec<ReprocessError>,
}

/// Worker callback: derivatives are built
#[derive(Debug, Deserialize)]
pub struct CompleteCallbackRequest {
    pub thumb_key: String,
    pub preview_key: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// Worker callback: derivative build failed
#[derive(Debug, Deserialize)]
pub struct FailCallbackRequest {
    pub reason: Option<String>,
}

/// Retoucher claim / delivery requests
#[derive(Debug, Deserialize)]
pub struct RetouchClaimRequest {
    pub retoucher_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RetouchUploadRequest {
    pub retoucher_id: String,
}
