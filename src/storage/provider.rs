use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Storage-level error, kept separate from the HTTP error type so callers
/// can tell "don't retry" (NotFound, InvalidKey) from "retry with backoff"
/// (Unavailable).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result of a completed upload
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: String,
}

/// One part of a multipart upload, as reported back by the client or the
/// server-side fallback path
#[derive(Debug, Clone)]
pub struct PartEtag {
    pub part_number: i32,
    pub etag: String,
}

/// Object listing entry
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

/// Uniform interface over an S3-compatible object store. One implementation
/// per vendor; all share identical semantics. The adapter never retries and
/// never caches object existence; every probe is a live call.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload a full object in one shot
    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>)
        -> StorageResult<PutResult>;

    /// Download a full object
    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Mint a time-limited URL for a direct PUT; no network call to the
    /// object itself
    async fn presigned_put_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Mint a time-limited URL for a direct GET
    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Start a multipart upload, returning the backend's upload id
    async fn init_multipart(&self, key: &str, content_type: Option<&str>)
        -> StorageResult<String>;

    /// Mint a time-limited URL for uploading one part directly
    async fn presigned_part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> StorageResult<String>;

    /// Server-side fallback for uploading one part
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<PartEtag>;

    /// Stitch the uploaded parts into the final object
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartEtag],
    ) -> StorageResult<()>;

    /// Terminate a multipart upload, discarding uploaded parts
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Server-side copy
    async fn copy(&self, src_key: &str, dest_key: &str) -> StorageResult<()>;

    /// Delete an object; deleting a missing object is not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Live existence probe
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List objects under a prefix
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Reject keys that would escape the bucket namespace or confuse a
/// path-mapped backend.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > 1024 {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key.chars().any(|c| c.is_control()) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
