use bytes::Bytes;
use chrono::Utc;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use crate::config::PackageConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    CreatePackageRequest, CreatePackageResponse, PackageDownload, PackageStatus,
    PackageStatusResponse, Photo, PhotoSelection, PhotoStatus,
};
use crate::services::albums::AlbumService;
use crate::services::photos::PhotoService;
use crate::storage::ObjectStorage;

/// Batch export: resolves a photo selection into a package row and builds
/// the zip archive in the background. Clients poll for the download URL.
pub struct PackageService;

impl PackageService {
    fn archive_key(album_id: &str, package_id: &str) -> String {
        format!("packages/{}/{}.zip", album_id, package_id)
    }

    /// Create a package job. Only completed, non-deleted photos of a
    /// download-enabled album are eligible; the count is hard-capped.
    pub async fn create(
        db: &Database,
        storage: Arc<dyn ObjectStorage>,
        config: &PackageConfig,
        album_id: &str,
        req: CreatePackageRequest,
    ) -> Result<CreatePackageResponse> {
        let album = AlbumService::get_active(db, album_id).await?;
        if !album.allow_download {
            return Err(AppError::Forbidden(format!(
                "Album does not allow downloads: {}",
                album_id
            )));
        }
        if !req.include_original && !req.include_watermarked {
            return Err(AppError::BadRequest(
                "Package must include originals or watermarked renditions".to_string(),
            ));
        }

        let photo_ids = match req.photo_selection {
            PhotoSelection::All => PhotoService::album_completed_photo_ids(db, &album.id).await?,
            PhotoSelection::Selected | PhotoSelection::Custom => {
                let ids = req
                    .photo_ids
                    .as_ref()
                    .filter(|ids| !ids.is_empty())
                    .ok_or_else(|| {
                        AppError::BadRequest("photo_ids is required for this selection".to_string())
                    })?;
                for id in ids {
                    let photo = PhotoService::get(db, id).await?;
                    if photo.album_id != album.id {
                        return Err(AppError::BadRequest(format!(
                            "Photo {} does not belong to album {}",
                            id, album.id
                        )));
                    }
                    if photo.get_status() != Some(PhotoStatus::Completed) {
                        return Err(AppError::BadRequest(format!(
                            "Photo {} is not completed",
                            id
                        )));
                    }
                }
                ids.clone()
            }
        };

        if photo_ids.is_empty() {
            return Err(AppError::BadRequest(
                "No eligible photos to package".to_string(),
            ));
        }
        if photo_ids.len() > config.max_photos {
            return Err(AppError::BadRequest(format!(
                "Package of {} photos exceeds maximum of {}",
                photo_ids.len(),
                config.max_photos
            )));
        }

        let package_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = (now + chrono::Duration::days(config.retention_days)).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO package_downloads
                (id, album_id, photo_ids, include_watermarked, include_original,
                 status, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(&package_id)
        .bind(&album.id)
        .bind(serde_json::to_string(&photo_ids).unwrap_or_else(|_| "[]".to_string()))
        .bind(req.include_watermarked)
        .bind(req.include_original)
        .bind(&expires_at)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(db.pool())
        .await?;

        tracing::info!(
            package_id = %package_id,
            album_id = %album.id,
            photos = photo_ids.len(),
            "Package job created"
        );

        // Build out of band; the client polls for completion
        let build_db = db.clone();
        let build_id = package_id.clone();
        tokio::spawn(async move {
            if let Err(e) = PackageService::build_archive(&build_db, storage, &build_id).await {
                tracing::error!(package_id = %build_id, "Package build failed: {}", e);
            }
        });

        Ok(CreatePackageResponse {
            package_id,
            status: PackageStatus::Pending.as_str().to_string(),
        })
    }

    /// Build the archive for a pending package. Failures are recorded on the
    /// row so the poll surface reports a definitive terminal state.
    pub async fn build_archive(
        db: &Database,
        storage: Arc<dyn ObjectStorage>,
        package_id: &str,
    ) -> Result<()> {
        let claimed = sqlx::query(
            "UPDATE package_downloads SET status = 'processing', updated_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(package_id)
        .execute(db.pool())
        .await?;
        if claimed.rows_affected() == 0 {
            // Another builder already claimed it
            return Ok(());
        }

        let package = Self::get_row(db, package_id).await?;

        match Self::assemble(db, storage.as_ref(), &package).await {
            Ok(archive_key) => {
                sqlx::query(
                    "UPDATE package_downloads SET status = 'completed', archive_key = ?, \
                     updated_at = ? WHERE id = ? AND status = 'processing'",
                )
                .bind(&archive_key)
                .bind(Utc::now().to_rfc3339())
                .bind(package_id)
                .execute(db.pool())
                .await?;
                tracing::info!(package_id = %package_id, key = %archive_key, "Package built");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                sqlx::query(
                    "UPDATE package_downloads SET status = 'failed', error = ?, updated_at = ? \
                     WHERE id = ? AND status = 'processing'",
                )
                .bind(&message)
                .bind(Utc::now().to_rfc3339())
                .bind(package_id)
                .execute(db.pool())
                .await?;
                tracing::error!(package_id = %package_id, "Package assembly failed: {}", message);
                Ok(())
            }
        }
    }

    /// Pull the photo bytes out of storage and zip them
    async fn assemble(
        db: &Database,
        storage: &dyn ObjectStorage,
        package: &PackageDownload,
    ) -> Result<String> {
        let mut entries: Vec<(String, Bytes)> = Vec::new();
        let mut used_names: HashSet<String> = HashSet::new();

        for photo_id in package.photo_id_list() {
            let photo = PhotoService::get(db, &photo_id).await?;

            if package.include_original {
                let data = storage.download(&photo.original_key).await?;
                entries.push((Self::entry_name(&photo, "", &mut used_names), data));
            }
            if package.include_watermarked {
                if let Some(preview_key) = &photo.preview_key {
                    let data = storage.download(preview_key).await?;
                    entries.push((
                        Self::entry_name(&photo, "watermarked/", &mut used_names),
                        data,
                    ));
                } else {
                    tracing::warn!(
                        photo_id = %photo.id,
                        "No watermarked rendition recorded, skipping"
                    );
                }
            }
        }

        let archive = tokio::task::spawn_blocking(move || Self::write_zip(entries))
            .await
            .map_err(|e| AppError::Internal(format!("zip task panicked: {}", e)))??;

        let archive_key = Self::archive_key(&package.album_id, &package.id);
        storage
            .upload(&archive_key, Bytes::from(archive), Some("application/zip"))
            .await?;

        Ok(archive_key)
    }

    fn entry_name(photo: &Photo, prefix: &str, used: &mut HashSet<String>) -> String {
        let mut name = format!("{}{}", prefix, photo.filename);
        if !used.insert(name.clone()) {
            name = format!("{}{}_{}", prefix, photo.id, photo.filename);
            used.insert(name.clone());
        }
        name
    }

    fn write_zip(entries: Vec<(String, Bytes)>) -> Result<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, data) in entries {
            writer
                .start_file(name, options)
                .map_err(|e| AppError::Internal(format!("zip write failed: {}", e)))?;
            writer
                .write_all(&data)
                .map_err(|e| AppError::Internal(format!("zip write failed: {}", e)))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| AppError::Internal(format!("zip finish failed: {}", e)))?;
        Ok(cursor.into_inner())
    }

    async fn get_row(db: &Database, package_id: &str) -> Result<PackageDownload> {
        let package: PackageDownload =
            sqlx::query_as("SELECT * FROM package_downloads WHERE id = ?")
                .bind(package_id)
                .fetch_optional(db.pool())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Package not found: {}", package_id)))?;
        Ok(package)
    }

    /// Status poll; mints a presigned download URL once the archive exists
    pub async fn get(
        db: &Database,
        storage: &dyn ObjectStorage,
        config: &PackageConfig,
        package_id: &str,
    ) -> Result<PackageStatusResponse> {
        let package = Self::get_row(db, package_id).await?;

        let download_url = match (package.get_status(), &package.archive_key) {
            (Some(PackageStatus::Completed), Some(archive_key)) => Some(
                storage
                    .presigned_get_url(archive_key, Duration::from_secs(config.url_ttl_secs))
                    .await?,
            ),
            _ => None,
        };

        Ok(PackageStatusResponse {
            package_id: package.id,
            status: package.status,
            download_url,
            error: package.error,
        })
    }
}
