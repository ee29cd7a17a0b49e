use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Photo, PhotoStatus};
use crate::services::photos::PhotoService;
use crate::storage::ObjectStorage;

/// Prefixes that hold originals; anything under them that no row references
/// is an orphaned file.
const ORIGINAL_PREFIXES: &[&str] = &["raw/", "retouched/"];

const DEFAULT_BATCH_SIZE: i64 = 100;
const MAX_BATCH_SIZE: i64 = 1000;

/// Consistency-check request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileOptions {
    #[serde(default)]
    pub auto_fix: bool,
    #[serde(default)]
    pub delete_orphaned_files: bool,
    #[serde(default)]
    pub delete_orphaned_records: bool,
    pub batch_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InconsistentDetail {
    pub photo_id: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileDetails {
    pub orphaned_files: Vec<String>,
    pub orphaned_records: Vec<String>,
    pub inconsistent_records: Vec<InconsistentDetail>,
}

/// Consistency-check summary plus the offending keys/ids
#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub total_checked: usize,
    pub inconsistencies: usize,
    pub fixed: usize,
    pub orphaned_files: usize,
    pub orphaned_records: usize,
    pub details: ReconcileDetails,
}

/// Batch drift detection between the photos table and the object store.
/// Report-only by default; every destructive repair needs double opt-in.
pub struct ReconcileService;

impl ReconcileService {
    pub async fn check(
        db: &Database,
        storage: &dyn ObjectStorage,
        pending_grace_secs: i64,
        opts: &ReconcileOptions,
    ) -> Result<ReconcileReport> {
        // The destructive flags mean nothing without the parent auto_fix;
        // reject the combination before any scanning starts.
        if (opts.delete_orphaned_files || opts.delete_orphaned_records) && !opts.auto_fix {
            return Err(AppError::BadRequest(
                "delete_orphaned_files/delete_orphaned_records require auto_fix".to_string(),
            ));
        }

        let batch_size = opts
            .batch_size
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .clamp(1, MAX_BATCH_SIZE);

        let mut details = ReconcileDetails::default();
        let mut total_checked = 0usize;
        let mut fixed = 0usize;
        let mut referenced: HashSet<String> = HashSet::new();

        let mut offset = 0i64;
        loop {
            let page = PhotoService::page_all(db, offset, batch_size).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;

            for photo in &page {
                // Soft-deleted rows still own their objects until a purge
                // runs, so their keys count as referenced either way.
                referenced.insert(photo.original_key.clone());
                if let Some(key) = &photo.preview_key {
                    referenced.insert(key.clone());
                }
                if let Some(key) = &photo.thumb_key {
                    referenced.insert(key.clone());
                }

                if photo.deleted_at.is_some() {
                    continue;
                }
                total_checked += 1;

                fixed += Self::check_record(db, storage, pending_grace_secs, opts, photo, &mut details)
                    .await?;
            }
        }

        // Second direction: objects in storage that no row references
        for prefix in ORIGINAL_PREFIXES {
            for object in storage.list_objects(prefix).await? {
                if referenced.contains(&object.key) {
                    continue;
                }
                tracing::warn!(key = %object.key, "Orphaned file in storage");
                if opts.auto_fix && opts.delete_orphaned_files {
                    storage.delete(&object.key).await?;
                    fixed += 1;
                }
                details.orphaned_files.push(object.key);
            }
        }

        let report = ReconcileReport {
            total_checked,
            inconsistencies: details.inconsistent_records.len(),
            fixed,
            orphaned_files: details.orphaned_files.len(),
            orphaned_records: details.orphaned_records.len(),
            details,
        };

        tracing::info!(
            total_checked = report.total_checked,
            inconsistencies = report.inconsistencies,
            orphaned_files = report.orphaned_files,
            orphaned_records = report.orphaned_records,
            fixed = report.fixed,
            "Consistency check finished"
        );

        Ok(report)
    }

    /// Classify one live row; returns how many repairs were applied
    async fn check_record(
        db: &Database,
        storage: &dyn ObjectStorage,
        pending_grace_secs: i64,
        opts: &ReconcileOptions,
        photo: &Photo,
        details: &mut ReconcileDetails,
    ) -> Result<usize> {
        if !storage.exists(&photo.original_key).await? {
            // A fresh pending row legitimately has no bytes yet
            if photo.get_status() == Some(PhotoStatus::Pending)
                && Self::age_secs(&photo.created_at) < pending_grace_secs
            {
                return Ok(0);
            }

            tracing::warn!(
                photo_id = %photo.id,
                key = %photo.original_key,
                "Orphaned record: original missing from storage"
            );
            details.orphaned_records.push(photo.id.clone());
            if opts.auto_fix && opts.delete_orphaned_records {
                PhotoService::delete_row(db, &photo.id).await?;
                return Ok(1);
            }
            return Ok(0);
        }

        let reason = match photo.get_status() {
            Some(PhotoStatus::Completed) => {
                if photo.thumb_key.is_none() {
                    Some("completed without thumbnail key".to_string())
                } else if let Some(thumb_key) = &photo.thumb_key {
                    if !storage.exists(thumb_key).await? {
                        Some(format!("thumbnail object missing: {}", thumb_key))
                    } else if let Some(preview_key) = &photo.preview_key {
                        if !storage.exists(preview_key).await? {
                            Some(format!("preview object missing: {}", preview_key))
                        } else {
                            None
                        }
                    } else {
                        None
                    }
                } else {
                    None
                }
            }
            Some(PhotoStatus::Pending) | Some(PhotoStatus::Processing) | Some(PhotoStatus::Failed) => {
                // The inverse drift: derivative keys recorded on a photo
                // whose status says they should not exist yet
                photo
                    .thumb_key
                    .as_ref()
                    .map(|_| "derivative keys recorded for unprocessed photo".to_string())
            }
            _ => None,
        };

        let Some(reason) = reason else {
            return Ok(0);
        };

        tracing::warn!(photo_id = %photo.id, reason = %reason, "Inconsistent record");
        details.inconsistent_records.push(InconsistentDetail {
            photo_id: photo.id.clone(),
            reason,
        });

        if opts.auto_fix {
            // Requeueing is non-destructive and idempotent; the worker
            // rebuilds whatever is missing.
            if PhotoService::requeue_for_reprocess(db, &photo.id).await? {
                return Ok(1);
            }
        }
        Ok(0)
    }

    fn age_secs(created_at: &str) -> i64 {
        match chrono::DateTime::parse_from_rfc3339(created_at) {
            Ok(t) => (chrono::Utc::now() - t.with_timezone(&chrono::Utc)).num_seconds(),
            // Unparseable timestamps never get grace
            Err(_) => i64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::albums::AlbumService;
    use crate::storage::memory::MemoryStorage;

    async fn test_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    async fn seed_photo(db: &Database, album_id: &str, status: PhotoStatus) -> Photo {
        let photo_id = uuid::Uuid::new_v4().to_string();
        let key = format!("raw/{}/{}.jpg", album_id, photo_id);
        PhotoService::insert_pending(
            db,
            &photo_id,
            album_id,
            "photo.jpg",
            1024,
            "image/jpeg",
            None,
            &key,
        )
        .await
        .unwrap();
        if status != PhotoStatus::Pending {
            PhotoService::transition(db, &photo_id, &[PhotoStatus::Pending], status)
                .await
                .unwrap();
        }
        PhotoService::get(db, &photo_id).await.unwrap()
    }

    fn report_only() -> ReconcileOptions {
        ReconcileOptions::default()
    }

    #[tokio::test]
    async fn destructive_flags_require_auto_fix() {
        let db = test_db().await;
        let storage = MemoryStorage::new();

        let opts = ReconcileOptions {
            auto_fix: false,
            delete_orphaned_files: true,
            ..Default::default()
        };
        let err = ReconcileService::check(&db, &storage, 3600, &opts).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let opts = ReconcileOptions {
            auto_fix: false,
            delete_orphaned_records: true,
            ..Default::default()
        };
        let err = ReconcileService::check(&db, &storage, 3600, &opts).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn orphaned_file_is_reported_then_repaired() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        storage.insert("raw/albumA/stray.jpg", b"bytes");

        let report = ReconcileService::check(&db, &storage, 3600, &report_only())
            .await
            .unwrap();
        assert_eq!(report.orphaned_files, 1);
        assert_eq!(report.fixed, 0);
        assert_eq!(report.details.orphaned_files, vec!["raw/albumA/stray.jpg"]);
        // Report-only runs never mutate
        assert!(storage.contains("raw/albumA/stray.jpg"));

        let opts = ReconcileOptions {
            auto_fix: true,
            delete_orphaned_files: true,
            ..Default::default()
        };
        let report = ReconcileService::check(&db, &storage, 3600, &opts).await.unwrap();
        assert_eq!(report.orphaned_files, 1);
        assert_eq!(report.fixed, 1);
        assert!(!storage.contains("raw/albumA/stray.jpg"));

        // A second run no longer reports it
        let report = ReconcileService::check(&db, &storage, 3600, &report_only())
            .await
            .unwrap();
        assert_eq!(report.orphaned_files, 0);
    }

    #[tokio::test]
    async fn orphaned_record_needs_double_opt_in() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();
        // Failed photo whose original never landed
        let photo = seed_photo(&db, &album.id, PhotoStatus::Failed).await;

        let report = ReconcileService::check(&db, &storage, 3600, &report_only())
            .await
            .unwrap();
        assert_eq!(report.orphaned_records, 1);
        assert_eq!(report.details.orphaned_records, vec![photo.id.clone()]);

        // auto_fix alone must not delete records
        let opts = ReconcileOptions {
            auto_fix: true,
            ..Default::default()
        };
        let report = ReconcileService::check(&db, &storage, 3600, &opts).await.unwrap();
        assert_eq!(report.orphaned_records, 1);
        assert!(PhotoService::get(&db, &photo.id).await.is_ok());

        let opts = ReconcileOptions {
            auto_fix: true,
            delete_orphaned_records: true,
            ..Default::default()
        };
        let report = ReconcileService::check(&db, &storage, 3600, &opts).await.unwrap();
        assert_eq!(report.fixed, 1);
        assert!(PhotoService::get(&db, &photo.id).await.is_err());
    }

    #[tokio::test]
    async fn fresh_pending_rows_get_grace() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();
        let photo = seed_photo(&db, &album.id, PhotoStatus::Pending).await;

        // Within the grace window the missing object is not drift
        let report = ReconcileService::check(&db, &storage, 3600, &report_only())
            .await
            .unwrap();
        assert_eq!(report.orphaned_records, 0);
        assert_eq!(report.total_checked, 1);

        // Past the grace window it is
        let report = ReconcileService::check(&db, &storage, 0, &report_only())
            .await
            .unwrap();
        assert_eq!(report.orphaned_records, 1);
        assert_eq!(report.details.orphaned_records, vec![photo.id]);
    }

    #[tokio::test]
    async fn inconsistent_completed_photo_is_requeued() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();
        let photo = seed_photo(&db, &album.id, PhotoStatus::Completed).await;
        storage.insert(&photo.original_key, b"original");
        // Completed but no thumbnail was ever recorded

        let report = ReconcileService::check(&db, &storage, 3600, &report_only())
            .await
            .unwrap();
        assert_eq!(report.inconsistencies, 1);
        assert_eq!(report.fixed, 0);
        let stored = PhotoService::get(&db, &photo.id).await.unwrap();
        assert_eq!(stored.get_status(), Some(PhotoStatus::Completed));

        let opts = ReconcileOptions {
            auto_fix: true,
            ..Default::default()
        };
        let report = ReconcileService::check(&db, &storage, 3600, &opts).await.unwrap();
        assert_eq!(report.inconsistencies, 1);
        assert_eq!(report.fixed, 1);
        let stored = PhotoService::get(&db, &photo.id).await.unwrap();
        assert_eq!(stored.get_status(), Some(PhotoStatus::Pending));
    }

    #[tokio::test]
    async fn missing_thumbnail_object_is_inconsistent() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();
        let photo = seed_photo(&db, &album.id, PhotoStatus::Pending).await;
        storage.insert(&photo.original_key, b"original");

        PhotoService::transition(&db, &photo.id, &[PhotoStatus::Pending], PhotoStatus::Processing)
            .await
            .unwrap();
        PhotoService::mark_completed(&db, &photo.id, "thumbs/gone.jpg", None, None, None)
            .await
            .unwrap();
        // Thumbnail key recorded but the object never made it

        let report = ReconcileService::check(&db, &storage, 3600, &report_only())
            .await
            .unwrap();
        assert_eq!(report.inconsistencies, 1);
        assert!(report.details.inconsistent_records[0]
            .reason
            .contains("thumbs/gone.jpg"));
    }

    #[tokio::test]
    async fn healthy_photos_produce_a_clean_report() {
        let db = test_db().await;
        let storage = MemoryStorage::new();
        let album = AlbumService::create(&db, "A", true, None).await.unwrap();
        let photo = seed_photo(&db, &album.id, PhotoStatus::Pending).await;
        storage.insert(&photo.original_key, b"original");
        storage.insert("thumbs/t.jpg", b"thumb");

        PhotoService::transition(&db, &photo.id, &[PhotoStatus::Pending], PhotoStatus::Processing)
            .await
            .unwrap();
        PhotoService::mark_completed(&db, &photo.id, "thumbs/t.jpg", None, Some(100), Some(66))
            .await
            .unwrap();

        let report = ReconcileService::check(&db, &storage, 3600, &report_only())
            .await
            .unwrap();
        assert_eq!(report.total_checked, 1);
        assert_eq!(report.inconsistencies, 0);
        assert_eq!(report.orphaned_files, 0);
        assert_eq!(report.orphaned_records, 0);
    }
}
