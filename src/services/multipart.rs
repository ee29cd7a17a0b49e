use std::time::Duration;

use crate::config::UploadConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::services::photos::PhotoService;
use crate::services::upload::UploadService;
use crate::storage::{ObjectStorage, PartEtag};

/// Multipart upload orchestration for originals above the single-PUT
/// comfort zone. The storage backend owns the multipart session; this
/// service owns the placeholder row and makes sure a session is always
/// terminated.
pub struct MultipartService;

/// What `init` hands back to the client
#[derive(Debug)]
pub struct InitiatedUpload {
    pub photo_id: String,
    pub upload_id: String,
    pub key: String,
    pub part_size: u64,
}

impl MultipartService {
    /// Validate and start a multipart upload, creating the pending photo row
    pub async fn init(
        db: &Database,
        storage: &dyn ObjectStorage,
        config: &UploadConfig,
        album_id: &str,
        filename: &str,
        content_type: &str,
        file_size: i64,
        content_hash: Option<&str>,
    ) -> Result<InitiatedUpload> {
        let album = crate::services::albums::AlbumService::get_active(db, album_id).await?;
        let extension = UploadService::validate_upload(config, filename, content_type, file_size)?;

        let photo_id = uuid::Uuid::new_v4().to_string();
        let key = UploadService::original_key(&album.id, &photo_id, &extension);

        PhotoService::insert_pending(
            db,
            &photo_id,
            &album.id,
            filename,
            file_size,
            content_type,
            content_hash,
            &key,
        )
        .await?;

        let upload_id = match storage.init_multipart(&key, Some(content_type)).await {
            Ok(id) => id,
            Err(e) => {
                PhotoService::delete_row(db, &photo_id).await?;
                tracing::warn!(
                    photo_id = %photo_id,
                    "Rolled back photo row after multipart init failure: {}",
                    e
                );
                return Err(AppError::UploadCredential(format!(
                    "Failed to start multipart upload: {}",
                    e
                )));
            }
        };

        tracing::info!(
            photo_id = %photo_id,
            upload_id = %upload_id,
            key = %key,
            "Initiated multipart upload"
        );

        Ok(InitiatedUpload {
            photo_id,
            upload_id,
            key,
            part_size: config.part_size_bytes,
        })
    }

    /// Mint a presigned URL for one part
    pub async fn sign_part(
        storage: &dyn ObjectStorage,
        config: &UploadConfig,
        key: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<String> {
        if part_number < 1 || part_number > 10_000 {
            return Err(AppError::BadRequest(format!(
                "Part number out of range: {}",
                part_number
            )));
        }
        let url = storage
            .presigned_part_url(
                key,
                upload_id,
                part_number,
                Duration::from_secs(config.url_ttl_secs),
            )
            .await?;
        Ok(url)
    }

    /// Stitch the parts together. On completion failure the session is
    /// aborted best-effort so it cannot leak.
    pub async fn complete(
        storage: &dyn ObjectStorage,
        key: &str,
        upload_id: &str,
        parts: Vec<PartEtag>,
    ) -> Result<()> {
        if parts.is_empty() {
            return Err(AppError::BadRequest("No parts to complete".to_string()));
        }

        if let Err(e) = storage.complete_multipart(key, upload_id, &parts).await {
            if let Err(abort_err) = storage.abort_multipart(key, upload_id).await {
                tracing::warn!(
                    upload_id = %upload_id,
                    "Failed to abort multipart upload after completion error: {}",
                    abort_err
                );
            }
            return Err(e.into());
        }

        tracing::info!(upload_id = %upload_id, key = %key, "Completed multipart upload");
        Ok(())
    }

    /// Abort the session and drop the placeholder row if it never got bytes
    pub async fn abort(
        db: &Database,
        storage: &dyn ObjectStorage,
        photo_id: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        if let Err(e) = storage.abort_multipart(key, upload_id).await {
            // A dangling session is a storage-cost leak, not a correctness
            // bug; log and keep going so the row still gets cleaned up.
            tracing::warn!(upload_id = %upload_id, "Failed to abort multipart upload: {}", e);
        }

        PhotoService::delete_pending_row(db, photo_id).await?;
        tracing::info!(photo_id = %photo_id, upload_id = %upload_id, "Aborted multipart upload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::albums::AlbumService;
    use crate::storage::memory::MemoryStorage;
    use bytes::Bytes;

    async fn test_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[tokio::test]
    async fn init_complete_assembles_object() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let config = UploadConfig::default();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();

        let init = MultipartService::init(
            &db,
            &storage,
            &config,
            &album.id,
            "big.jpg",
            "image/jpeg",
            64 * 1024 * 1024,
            None,
        )
        .await
        .unwrap();

        let p1 = storage
            .upload_part(&init.key, &init.upload_id, 1, Bytes::from_static(b"AAAA"))
            .await
            .unwrap();
        let p2 = storage
            .upload_part(&init.key, &init.upload_id, 2, Bytes::from_static(b"BBBB"))
            .await
            .unwrap();

        MultipartService::complete(&storage, &init.key, &init.upload_id, vec![p1, p2])
            .await
            .unwrap();

        assert!(storage.contains(&init.key));
        assert_eq!(storage.open_multipart_count(), 0);

        let photo = PhotoService::get(&db, &init.photo_id).await.unwrap();
        assert_eq!(photo.original_key, init.key);
    }

    #[tokio::test]
    async fn abort_terminates_session_and_drops_placeholder() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let config = UploadConfig::default();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();

        let init = MultipartService::init(
            &db,
            &storage,
            &config,
            &album.id,
            "big.jpg",
            "image/jpeg",
            64 * 1024 * 1024,
            None,
        )
        .await
        .unwrap();
        assert_eq!(storage.open_multipart_count(), 1);

        MultipartService::abort(&db, &storage, &init.photo_id, &init.key, &init.upload_id)
            .await
            .unwrap();

        assert_eq!(storage.open_multipart_count(), 0);
        let err = PhotoService::get(&db, &init.photo_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn init_failure_rolls_back_placeholder_row() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let config = UploadConfig::default();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();
        storage.set_unavailable(true);

        let err = MultipartService::init(
            &db,
            &storage,
            &config,
            &album.id,
            "big.jpg",
            "image/jpeg",
            64 * 1024 * 1024,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::UploadCredential(_)));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM photos")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn rejects_out_of_range_part_numbers() {
        let storage = MemoryStorage::new();
        let config = UploadConfig::default();

        let err = MultipartService::sign_part(&storage, &config, "raw/a/p.jpg", "u1", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = MultipartService::sign_part(&storage, &config, "raw/a/p.jpg", "u1", 10_001)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
