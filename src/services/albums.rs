use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::Album;

/// Album lookups for gating uploads and downloads. Album CRUD itself lives
/// in the admin tier; the pipeline only ever reads and seeds.
pub struct AlbumService;

impl AlbumService {
    /// Fetch a live (non-deleted) album
    pub async fn get(db: &Database, album_id: &str) -> Result<Album> {
        let album: Album =
            sqlx::query_as("SELECT * FROM albums WHERE id = ? AND deleted_at IS NULL")
                .bind(album_id)
                .fetch_optional(db.pool())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Album not found: {}", album_id)))?;
        Ok(album)
    }

    /// Fetch an album and require it to be accepting uploads/downloads
    pub async fn get_active(db: &Database, album_id: &str) -> Result<Album> {
        let album = Self::get(db, album_id).await?;
        if album.is_expired() {
            return Err(AppError::Forbidden(format!("Album has expired: {}", album_id)));
        }
        Ok(album)
    }

    /// Seed an album row
    pub async fn create(
        db: &Database,
        name: &str,
        allow_download: bool,
        expires_at: Option<String>,
    ) -> Result<Album> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO albums (id, name, allow_download, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(allow_download)
        .bind(&expires_at)
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await?;

        Self::get(db, &id).await
    }
}
