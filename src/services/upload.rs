use std::time::Duration;

use crate::config::UploadConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{PhotoStatus, RequestUploadRequest, RequestUploadResponse};
use crate::services::albums::AlbumService;
use crate::services::photos::PhotoService;
use crate::storage::ObjectStorage;

/// Upload orchestration: validates a proposed upload, allocates the id and
/// storage key, writes the `pending` placeholder row and hands back a
/// time-limited presigned PUT credential.
pub struct UploadService;

impl UploadService {
    /// Validate filename, declared type and size; returns the lowercased
    /// file extension on success.
    pub fn validate_upload(
        config: &UploadConfig,
        filename: &str,
        content_type: &str,
        file_size: i64,
    ) -> Result<String> {
        if filename.is_empty() {
            return Err(AppError::BadRequest("Filename is required".to_string()));
        }
        if filename.len() > config.max_filename_len {
            return Err(AppError::BadRequest(format!(
                "Filename exceeds {} characters",
                config.max_filename_len
            )));
        }
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(AppError::BadRequest(
                "Filename must not contain path separators".to_string(),
            ));
        }

        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 8)
            .ok_or_else(|| AppError::BadRequest("File extension is required".to_string()))?;

        let declared = content_type.to_ascii_lowercase();
        if !config.allowed_types.iter().any(|t| t == &declared) {
            return Err(AppError::BadRequest(format!(
                "File type not allowed: {}",
                content_type
            )));
        }

        // Cross-check the declared type against the extension-derived one to
        // reject spoofed uploads (a .png declared as image/jpeg).
        let guesses = mime_guess::from_ext(&extension);
        if guesses.count() > 0 && !guesses.iter().any(|m| m.essence_str() == declared) {
            return Err(AppError::BadRequest(format!(
                "File extension .{} does not match declared type {}",
                extension, content_type
            )));
        }

        if file_size <= 0 {
            return Err(AppError::BadRequest("File size must be positive".to_string()));
        }
        if file_size as u64 > config.max_size_bytes {
            return Err(AppError::BadRequest(format!(
                "File too large: {} bytes exceeds limit of {}",
                file_size, config.max_size_bytes
            )));
        }

        Ok(extension)
    }

    /// Derive the original storage key; deterministic so it never needs
    /// recomputation later.
    pub fn original_key(album_id: &str, photo_id: &str, extension: &str) -> String {
        format!("raw/{}/{}.{}", album_id, photo_id, extension)
    }

    /// Issue an upload credential for a new photo
    pub async fn request_upload(
        db: &Database,
        storage: &dyn ObjectStorage,
        config: &UploadConfig,
        album_id: &str,
        req: RequestUploadRequest,
    ) -> Result<RequestUploadResponse> {
        let album = AlbumService::get_active(db, album_id).await?;
        let extension =
            Self::validate_upload(config, &req.filename, &req.content_type, req.file_size)?;

        let photo_id = uuid::Uuid::new_v4().to_string();
        let original_key = Self::original_key(&album.id, &photo_id, &extension);

        // The row must exist before the credential goes out, so a client
        // that never uploads still leaves state reconciliation can find.
        PhotoService::insert_pending(
            db,
            &photo_id,
            &album.id,
            &req.filename,
            req.file_size,
            &req.content_type,
            req.hash.as_deref(),
            &original_key,
        )
        .await?;

        let upload_url = match storage
            .presigned_put_url(&original_key, Duration::from_secs(config.url_ttl_secs))
            .await
        {
            Ok(url) => url,
            Err(e) => {
                // Compensate: no credential means the placeholder is garbage
                PhotoService::delete_row(db, &photo_id).await?;
                tracing::warn!(
                    photo_id = %photo_id,
                    "Rolled back photo row after presign failure: {}",
                    e
                );
                return Err(AppError::UploadCredential(format!(
                    "Failed to issue upload credential: {}",
                    e
                )));
            }
        };

        tracing::info!(
            photo_id = %photo_id,
            album_id = %album.id,
            key = %original_key,
            "Issued upload credential"
        );

        Ok(RequestUploadResponse {
            photo_id,
            upload_url,
            original_key,
            album_id: album.id,
        })
    }

    /// Issue a retouch-delivery credential for an existing photo. Reuses the
    /// photo id, points `original_key` into the `retouched/` namespace and
    /// loops the photo back to `pending`. No new row is created.
    pub async fn request_retouch_upload(
        db: &Database,
        storage: &dyn ObjectStorage,
        config: &UploadConfig,
        photo_id: &str,
        retoucher_id: &str,
    ) -> Result<RequestUploadResponse> {
        let photo = PhotoService::get(db, photo_id).await?;

        if photo.get_status() != Some(PhotoStatus::Retouching) {
            return Err(AppError::BadRequest(format!(
                "Photo is not being retouched: {}",
                photo_id
            )));
        }

        let extension = photo
            .original_key
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_else(|| "jpg".to_string());
        let new_key = format!(
            "retouched/{}/{}_{}.{}",
            photo.album_id,
            photo.id,
            chrono::Utc::now().timestamp(),
            extension
        );

        let upload_url = storage
            .presigned_put_url(&new_key, Duration::from_secs(config.url_ttl_secs))
            .await
            .map_err(|e| {
                AppError::UploadCredential(format!("Failed to issue upload credential: {}", e))
            })?;

        if !PhotoService::apply_retouch_delivery(db, photo_id, &new_key, retoucher_id).await? {
            // Lost a race with another delivery or a state change
            return Err(AppError::BadRequest(format!(
                "Photo is not being retouched: {}",
                photo_id
            )));
        }

        tracing::info!(
            photo_id = %photo_id,
            retoucher_id = %retoucher_id,
            key = %new_key,
            "Issued retouch delivery credential"
        );

        Ok(RequestUploadResponse {
            photo_id: photo.id,
            upload_url,
            original_key: new_key,
            album_id: photo.album_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    async fn test_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    fn upload_req(filename: &str, content_type: &str, size: i64) -> RequestUploadRequest {
        RequestUploadRequest {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            file_size: size,
            hash: None,
        }
    }

    #[tokio::test]
    async fn issues_credential_and_pending_row() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let config = UploadConfig::default();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();

        let resp = UploadService::request_upload(
            &db,
            &storage,
            &config,
            &album.id,
            upload_req("photo.jpg", "image/jpeg", 2 * 1024 * 1024),
        )
        .await
        .unwrap();

        assert_eq!(
            resp.original_key,
            format!("raw/{}/{}.jpg", album.id, resp.photo_id)
        );
        assert!(resp.upload_url.contains(&resp.original_key));

        let photo = PhotoService::get(&db, &resp.photo_id).await.unwrap();
        assert_eq!(photo.get_status(), Some(PhotoStatus::Pending));
        assert_eq!(photo.original_key, resp.original_key);
        assert_eq!(photo.size, 2 * 1024 * 1024);
    }

    #[tokio::test]
    async fn rejects_bad_filenames_and_types() {
        let config = UploadConfig::default();

        for (filename, content_type) in [
            ("", "image/jpeg"),
            ("../../etc/passwd.jpg", "image/jpeg"),
            ("a/b.jpg", "image/jpeg"),
            ("noextension", "image/jpeg"),
            ("script.exe", "application/x-msdownload"),
            ("photo.png", "image/jpeg"), // extension/type mismatch
            ("notes.txt", "text/plain"),
        ] {
            let err =
                UploadService::validate_upload(&config, filename, content_type, 1024).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{}", filename);
        }

        let long_name = format!("{}.jpg", "a".repeat(300));
        let err = UploadService::validate_upload(&config, &long_name, "image/jpeg", 1024)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_and_empty_files() {
        let config = UploadConfig::default();
        let too_big = (config.max_size_bytes + 1) as i64;

        assert!(UploadService::validate_upload(&config, "p.jpg", "image/jpeg", 0).is_err());
        assert!(UploadService::validate_upload(&config, "p.jpg", "image/jpeg", too_big).is_err());
        assert!(UploadService::validate_upload(&config, "p.jpg", "image/jpeg", 1024).is_ok());
    }

    #[tokio::test]
    async fn presign_failure_rolls_back_placeholder_row() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        storage.set_fail_presign(true);
        let config = UploadConfig::default();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();

        let err = UploadService::request_upload(
            &db,
            &storage,
            &config,
            &album.id,
            upload_req("photo.jpg", "image/jpeg", 1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::UploadCredential(_)));

        // No orphaned pending row survives the failed credential request
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM photos")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn rejects_upload_to_missing_or_expired_album() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let config = UploadConfig::default();

        let err = UploadService::request_upload(
            &db,
            &storage,
            &config,
            "missing-album",
            upload_req("photo.jpg", "image/jpeg", 1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let past = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let expired = AlbumService::create(&db, "Old", true, Some(past)).await.unwrap();
        let err = UploadService::request_upload(
            &db,
            &storage,
            &config,
            &expired.id,
            upload_req("photo.jpg", "image/jpeg", 1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn retouch_delivery_reuses_id_and_resets_status() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let config = UploadConfig::default();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();

        let resp = UploadService::request_upload(
            &db,
            &storage,
            &config,
            &album.id,
            upload_req("photo.jpg", "image/jpeg", 1024),
        )
        .await
        .unwrap();

        // Not in retouching yet
        let err = UploadService::request_retouch_upload(&db, &storage, &config, &resp.photo_id, "r1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        PhotoService::route_to_retoucher(&db, &resp.photo_id).await.unwrap();
        PhotoService::claim_retouch(&db, &resp.photo_id, "r1").await.unwrap();

        let delivery =
            UploadService::request_retouch_upload(&db, &storage, &config, &resp.photo_id, "r1")
                .await
                .unwrap();

        assert_eq!(delivery.photo_id, resp.photo_id);
        assert!(delivery
            .original_key
            .starts_with(&format!("retouched/{}/{}_", album.id, resp.photo_id)));
        assert!(delivery.original_key.ends_with(".jpg"));

        let photo = PhotoService::get(&db, &resp.photo_id).await.unwrap();
        assert_eq!(photo.get_status(), Some(PhotoStatus::Pending));
        assert_eq!(photo.original_key, delivery.original_key);

        // Still exactly one row for this photo
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM photos")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
