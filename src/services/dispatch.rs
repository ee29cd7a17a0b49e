use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;

use crate::config::WorkerConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Photo, PhotoStatus, ReprocessError, ReprocessRequest, ReprocessResponse};
use crate::services::photos::PhotoService;

/// Job descriptor forwarded to the processing worker
#[derive(Debug, Clone, Serialize)]
pub struct ProcessJob {
    pub photo_id: String,
    pub album_id: String,
    pub original_key: String,
}

/// Outcome of a single dispatch attempt. `Degraded` is not a failure: the
/// photo stays in a re-dispatchable state and the caller surfaces a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    Degraded(String),
}

/// Originals above this size get the long multipart-scale timeout
const LARGE_JOB_BYTES: i64 = 64 * 1024 * 1024;

/// HTTP client for the derivative-processing worker
#[derive(Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    base_url: String,
    dispatch_timeout: Duration,
    bulk_timeout: Duration,
}

impl WorkerClient {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            dispatch_timeout: Duration::from_secs(config.dispatch_timeout_secs),
            bulk_timeout: Duration::from_secs(config.bulk_timeout_secs),
        }
    }

    /// Ask the worker to accept one job. Err carries the reason the job
    /// could not be handed over; the worker reports actual completion later
    /// through the callback endpoints.
    pub async fn submit_job(
        &self,
        job: &ProcessJob,
        large: bool,
    ) -> std::result::Result<(), String> {
        let url = format!("{}/jobs/process", self.base_url);
        let timeout = if large {
            self.bulk_timeout
        } else {
            self.dispatch_timeout
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(job)
            .send()
            .await
            .map_err(|e| format!("worker unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("worker returned {}", response.status()))
        }
    }
}

/// Processing dispatch: hands jobs to the worker and drives the status
/// state machine on the accept path.
pub struct DispatchService;

impl DispatchService {
    /// Dispatch one photo. Worker unreachability degrades to a warning
    /// instead of failing the request; losing the upload over a transient
    /// worker blip is worse than a delayed thumbnail.
    pub async fn dispatch(
        db: &Database,
        worker: &WorkerClient,
        photo: &Photo,
    ) -> Result<DispatchOutcome> {
        let job = ProcessJob {
            photo_id: photo.id.clone(),
            album_id: photo.album_id.clone(),
            original_key: photo.original_key.clone(),
        };

        match worker.submit_job(&job, photo.size > LARGE_JOB_BYTES).await {
            Ok(()) => {
                // Job accepted: pending -> processing. A duplicate dispatch
                // finds the photo already moved and falls through.
                PhotoService::transition(
                    db,
                    &photo.id,
                    &[PhotoStatus::Pending],
                    PhotoStatus::Processing,
                )
                .await?;
                tracing::info!(photo_id = %photo.id, "Dispatched photo for processing");
                Ok(DispatchOutcome::Queued)
            }
            Err(reason) => {
                tracing::warn!(
                    photo_id = %photo.id,
                    "Worker dispatch degraded, photo remains queued: {}",
                    reason
                );
                Ok(DispatchOutcome::Degraded(reason))
            }
        }
    }

    /// Resolve a batch request to a bounded list of photo ids. Over-cap
    /// requests are rejected before any photo is touched.
    pub async fn resolve_batch(
        db: &Database,
        req: &ReprocessRequest,
        max_batch_size: usize,
    ) -> Result<Vec<String>> {
        let ids = match (&req.photo_ids, &req.album_id) {
            (Some(ids), None) => {
                if ids.is_empty() {
                    return Err(AppError::BadRequest("photo_ids is empty".to_string()));
                }
                ids.clone()
            }
            (None, Some(album_id)) => {
                crate::services::albums::AlbumService::get(db, album_id).await?;
                PhotoService::album_photo_ids(db, album_id).await?
            }
            _ => {
                return Err(AppError::BadRequest(
                    "Provide exactly one of photo_ids or album_id".to_string(),
                ))
            }
        };

        if ids.len() > max_batch_size {
            return Err(AppError::BadRequest(format!(
                "Batch of {} photos exceeds maximum of {}",
                ids.len(),
                max_batch_size
            )));
        }

        Ok(ids)
    }

    /// Requeue and dispatch a batch with a bounded worker pool. One photo's
    /// failure never aborts the batch; failures are collected per photo.
    pub async fn dispatch_many(
        db: &Database,
        worker: &WorkerClient,
        config: &WorkerConfig,
        photo_ids: Vec<String>,
    ) -> Result<ReprocessResponse> {
        let total = photo_ids.len();
        let concurrency = config.concurrency.max(1);

        let results: Vec<std::result::Result<(), ReprocessError>> = stream::iter(photo_ids)
            .map(|photo_id| async move {
                Self::reprocess_one(db, worker, &photo_id)
                    .await
                    .map_err(|error| ReprocessError { photo_id, error })
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut queued = 0;
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(()) => queued += 1,
                Err(e) => errors.push(e),
            }
        }

        tracing::info!(
            total = total,
            queued = queued,
            failed = errors.len(),
            "Batch reprocess dispatched"
        );

        Ok(ReprocessResponse {
            queued,
            total,
            failed: errors.len(),
            errors,
        })
    }

    async fn reprocess_one(
        db: &Database,
        worker: &WorkerClient,
        photo_id: &str,
    ) -> std::result::Result<(), String> {
        let requeued = PhotoService::requeue_for_reprocess(db, photo_id)
            .await
            .map_err(|e| e.to_string())?;
        if !requeued {
            return Err("not eligible for reprocessing".to_string());
        }

        let photo = PhotoService::get(db, photo_id)
            .await
            .map_err(|e| e.to_string())?;

        match DispatchService::dispatch(db, worker, &photo)
            .await
            .map_err(|e| e.to_string())?
        {
            DispatchOutcome::Queued => Ok(()),
            // The photo sits safely in `pending`; report the dispatch miss
            DispatchOutcome::Degraded(reason) => Err(reason),
        }
    }
}
