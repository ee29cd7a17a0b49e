use axum::extract::{Json, Path, State};

use crate::error::{ApiResponse, Result};
use crate::models::{CreatePackageRequest, CreatePackageResponse, PackageStatusResponse};
use crate::services::PackageService;
use crate::AppState;

/// Create a batch-download package for an album
pub async fn create_package(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    Json(req): Json<CreatePackageRequest>,
) -> Result<Json<ApiResponse<CreatePackageResponse>>> {
    let resp = PackageService::create(
        &state.db,
        state.storage.clone(),
        &state.config.package,
        &album_id,
        req,
    )
    .await?;

    Ok(Json(ApiResponse::success(resp)))
}

/// Poll a package job; the download URL appears once the archive is built
pub async fn get_package(
    State(state): State<AppState>,
    Path(package_id): Path<String>,
) -> Result<Json<ApiResponse<PackageStatusResponse>>> {
    let resp = PackageService::get(
        &state.db,
        state.storage.as_ref(),
        &state.config.package,
        &package_id,
    )
    .await?;

    Ok(Json(ApiResponse::success(resp)))
}
