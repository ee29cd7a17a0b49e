use chrono::Utc;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Photo, PhotoStatus};

/// Statuses an explicit reprocess request may pull back to `pending`.
/// Retouch states are excluded: a photo parked with a human retoucher must
/// not be yanked back by automatic processing.
const REPROCESSABLE: &[PhotoStatus] = &[
    PhotoStatus::Pending,
    PhotoStatus::Failed,
    PhotoStatus::Processing,
    PhotoStatus::Completed,
];

/// Photo row access and the status state machine. Every transition is a
/// conditional update keyed on the expected prior status, so duplicate or
/// stale signals fall through as no-ops instead of corrupting state.
pub struct PhotoService;

impl PhotoService {
    /// Fetch a live (non-deleted) photo
    pub async fn get(db: &Database, photo_id: &str) -> Result<Photo> {
        let photo: Photo =
            sqlx::query_as("SELECT * FROM photos WHERE id = ? AND deleted_at IS NULL")
                .bind(photo_id)
                .fetch_optional(db.pool())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Photo not found: {}", photo_id)))?;
        Ok(photo)
    }

    /// Insert the placeholder row for a fresh upload; created in `pending`
    /// before any credential is handed out so a failed client upload still
    /// leaves traceable state behind.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_pending(
        db: &Database,
        photo_id: &str,
        album_id: &str,
        filename: &str,
        size: i64,
        mime_type: &str,
        content_hash: Option<&str>,
        original_key: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO photos
                (id, album_id, filename, size, mime_type, content_hash, original_key,
                 status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(photo_id)
        .bind(album_id)
        .bind(filename)
        .bind(size)
        .bind(mime_type)
        .bind(content_hash)
        .bind(original_key)
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await?;

        Ok(())
    }

    /// Hard-delete a row. Used as the compensating action when credential
    /// issuance fails, and by reconciliation for orphaned records.
    pub async fn delete_row(db: &Database, photo_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(photo_id)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    /// Delete a row only while it is still a `pending` placeholder
    pub async fn delete_pending_row(db: &Database, photo_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ? AND status = 'pending'")
            .bind(photo_id)
            .execute(db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Conditionally move a photo from one of `from` to `to`. Returns false
    /// when the stored status did not match, which is a no-op, not an error.
    pub async fn transition(
        db: &Database,
        photo_id: &str,
        from: &[PhotoStatus],
        to: PhotoStatus,
    ) -> Result<bool> {
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE photos SET status = ?, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(photo_id);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(db.pool()).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Requeue for processing. Valid from `pending` (idempotent) and
    /// `failed` only.
    pub async fn requeue(db: &Database, photo_id: &str) -> Result<bool> {
        Self::transition(
            db,
            photo_id,
            &[PhotoStatus::Pending, PhotoStatus::Failed],
            PhotoStatus::Pending,
        )
        .await
    }

    /// Requeue for an explicit reprocess request, which may also pull
    /// `processing` and `completed` photos back to `pending`.
    pub async fn requeue_for_reprocess(db: &Database, photo_id: &str) -> Result<bool> {
        Self::transition(db, photo_id, REPROCESSABLE, PhotoStatus::Pending).await
    }

    /// Worker callback: derivatives exist. Only valid from `processing`;
    /// a completed photo always carries at least a thumbnail key.
    pub async fn mark_completed(
        db: &Database,
        photo_id: &str,
        thumb_key: &str,
        preview_key: Option<&str>,
        width: Option<i64>,
        height: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE photos
            SET status = 'completed', thumb_key = ?, preview_key = ?,
                width = ?, height = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL AND status = 'processing'
            "#,
        )
        .bind(thumb_key)
        .bind(preview_key)
        .bind(width)
        .bind(height)
        .bind(Utc::now().to_rfc3339())
        .bind(photo_id)
        .execute(db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Worker callback: derivative build failed
    pub async fn mark_failed(db: &Database, photo_id: &str) -> Result<bool> {
        Self::transition(db, photo_id, &[PhotoStatus::Processing], PhotoStatus::Failed).await
    }

    /// Route a photo to the retouch queue
    pub async fn route_to_retoucher(db: &Database, photo_id: &str) -> Result<bool> {
        Self::transition(
            db,
            photo_id,
            &[PhotoStatus::Pending],
            PhotoStatus::PendingRetouch,
        )
        .await
    }

    /// A retoucher claims a routed photo
    pub async fn claim_retouch(db: &Database, photo_id: &str, retoucher_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE photos
            SET status = 'retouching', retoucher_id = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL AND status = 'pending_retouch'
            "#,
        )
        .bind(retoucher_id)
        .bind(Utc::now().to_rfc3339())
        .bind(photo_id)
        .execute(db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Retouch delivery: the only path that reassigns `original_key`.
    /// Resets the photo to `pending` and drops stale derivative state so
    /// the retouched original gets reprocessed from scratch.
    pub async fn apply_retouch_delivery(
        db: &Database,
        photo_id: &str,
        new_original_key: &str,
        retoucher_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE photos
            SET status = 'pending', original_key = ?, retoucher_id = ?,
                preview_key = NULL, thumb_key = NULL, width = NULL, height = NULL,
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL AND status = 'retouching'
            "#,
        )
        .bind(new_original_key)
        .bind(retoucher_id)
        .bind(Utc::now().to_rfc3339())
        .bind(photo_id)
        .execute(db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Ids of all live photos in an album, oldest first
    pub async fn album_photo_ids(db: &Database, album_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM photos WHERE album_id = ? AND deleted_at IS NULL ORDER BY created_at",
        )
        .bind(album_id)
        .fetch_all(db.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Ids of all live, completed photos in an album, oldest first
    pub async fn album_completed_photo_ids(db: &Database, album_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM photos \
             WHERE album_id = ? AND deleted_at IS NULL AND status = 'completed' \
             ORDER BY created_at",
        )
        .bind(album_id)
        .fetch_all(db.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// One reconciliation page over every row, soft-deleted included;
    /// the scanner decides what each row means.
    pub async fn page_all(db: &Database, offset: i64, limit: i64) -> Result<Vec<Photo>> {
        let photos: Vec<Photo> = sqlx::query_as("SELECT * FROM photos ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(db.pool())
            .await?;
        Ok(photos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::albums::AlbumService;

    async fn test_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    async fn seed_photo(db: &Database, status: PhotoStatus) -> String {
        let album = AlbumService::create(db, "Test", true, None).await.unwrap();
        let photo_id = uuid::Uuid::new_v4().to_string();
        let key = format!("raw/{}/{}.jpg", album.id, photo_id);
        PhotoService::insert_pending(
            db,
            &photo_id,
            &album.id,
            "photo.jpg",
            2048,
            "image/jpeg",
            None,
            &key,
        )
        .await
        .unwrap();
        if status != PhotoStatus::Pending {
            assert!(
                PhotoService::transition(db, &photo_id, &[PhotoStatus::Pending], status)
                    .await
                    .unwrap()
            );
        }
        photo_id
    }

    #[tokio::test]
    async fn requeue_is_idempotent_for_pending() {
        let db = test_db().await;
        let photo_id = seed_photo(&db, PhotoStatus::Pending).await;

        assert!(PhotoService::requeue(&db, &photo_id).await.unwrap());
        assert!(PhotoService::requeue(&db, &photo_id).await.unwrap());

        let photo = PhotoService::get(&db, &photo_id).await.unwrap();
        assert_eq!(photo.get_status(), Some(PhotoStatus::Pending));
    }

    #[tokio::test]
    async fn requeue_recovers_failed_photos() {
        let db = test_db().await;
        let photo_id = seed_photo(&db, PhotoStatus::Failed).await;

        assert!(PhotoService::requeue(&db, &photo_id).await.unwrap());
        let photo = PhotoService::get(&db, &photo_id).await.unwrap();
        assert_eq!(photo.get_status(), Some(PhotoStatus::Pending));
    }

    #[tokio::test]
    async fn mismatched_expected_status_is_a_noop() {
        let db = test_db().await;
        let photo_id = seed_photo(&db, PhotoStatus::Completed).await;

        // A stale dispatch signal expecting `pending` must not move a
        // completed photo.
        let moved = PhotoService::transition(
            &db,
            &photo_id,
            &[PhotoStatus::Pending],
            PhotoStatus::Processing,
        )
        .await
        .unwrap();
        assert!(!moved);

        let photo = PhotoService::get(&db, &photo_id).await.unwrap();
        assert_eq!(photo.get_status(), Some(PhotoStatus::Completed));
    }

    #[tokio::test]
    async fn duplicate_dispatch_signals_apply_once() {
        let db = test_db().await;
        let photo_id = seed_photo(&db, PhotoStatus::Pending).await;

        let first = PhotoService::transition(
            &db,
            &photo_id,
            &[PhotoStatus::Pending],
            PhotoStatus::Processing,
        )
        .await
        .unwrap();
        let second = PhotoService::transition(
            &db,
            &photo_id,
            &[PhotoStatus::Pending],
            PhotoStatus::Processing,
        )
        .await
        .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn mark_completed_requires_processing() {
        let db = test_db().await;
        let photo_id = seed_photo(&db, PhotoStatus::Pending).await;

        // Worker callback for a photo that was never dispatched
        let done = PhotoService::mark_completed(&db, &photo_id, "thumbs/x.jpg", None, None, None)
            .await
            .unwrap();
        assert!(!done);

        assert!(
            PhotoService::transition(&db, &photo_id, &[PhotoStatus::Pending], PhotoStatus::Processing)
                .await
                .unwrap()
        );
        let done = PhotoService::mark_completed(
            &db,
            &photo_id,
            "thumbs/x.jpg",
            Some("previews/x.jpg"),
            Some(4000),
            Some(2667),
        )
        .await
        .unwrap();
        assert!(done);

        let photo = PhotoService::get(&db, &photo_id).await.unwrap();
        assert_eq!(photo.get_status(), Some(PhotoStatus::Completed));
        assert_eq!(photo.thumb_key.as_deref(), Some("thumbs/x.jpg"));
        assert_eq!(photo.width, Some(4000));
    }

    #[tokio::test]
    async fn retouch_cycle_loops_back_to_pending() {
        let db = test_db().await;
        let photo_id = seed_photo(&db, PhotoStatus::Pending).await;

        assert!(PhotoService::route_to_retoucher(&db, &photo_id).await.unwrap());
        // Reprocess must not touch a photo parked for retouching
        assert!(!PhotoService::requeue_for_reprocess(&db, &photo_id).await.unwrap());

        assert!(PhotoService::claim_retouch(&db, &photo_id, "ret-1").await.unwrap());
        assert!(
            PhotoService::apply_retouch_delivery(&db, &photo_id, "retouched/a/p_1.jpg", "ret-1")
                .await
                .unwrap()
        );

        let photo = PhotoService::get(&db, &photo_id).await.unwrap();
        assert_eq!(photo.get_status(), Some(PhotoStatus::Pending));
        assert_eq!(photo.original_key, "retouched/a/p_1.jpg");
        assert_eq!(photo.retoucher_id.as_deref(), Some("ret-1"));
        assert!(photo.thumb_key.is_none());
    }
}
