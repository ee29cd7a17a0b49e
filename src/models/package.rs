use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a batch export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::Processing => "processing",
            PackageStatus::Completed => "completed",
            PackageStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PackageStatus::Pending),
            "processing" => Some(PackageStatus::Processing),
            "completed" => Some(PackageStatus::Completed),
            "failed" => Some(PackageStatus::Failed),
            _ => None,
        }
    }
}

/// Package download model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PackageDownload {
    pub id: String,
    pub album_id: String,
    /// JSON array of photo ids resolved at creation time
    pub photo_ids: String,
    pub include_watermarked: bool,
    pub include_original: bool,
    pub status: String,
    pub archive_key: Option<String>,
    pub error: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PackageDownload {
    pub fn get_status(&self) -> Option<PackageStatus> {
        PackageStatus::from_str(&self.status)
    }

    pub fn photo_id_list(&self) -> Vec<String> {
        serde_json::from_str(&self.photo_ids).unwrap_or_default()
    }
}

/// Which photos a package covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoSelection {
    All,
    Selected,
    /// Arbitrary caller-supplied id set; handled like `selected`
    Custom,
}

/// Create-package request
#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub photo_selection: PhotoSelection,
    pub photo_ids: Option<Vec<String>>,
    #[serde(default)]
    pub include_watermarked: bool,
    #[serde(default = "default_include_original")]
    pub include_original: bool,
}

fn default_include_original() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CreatePackageResponse {
    pub package_id: String,
    pub status: String,
}

/// Status poll response; the URL appears once the archive exists
#[derive(Debug, Serialize)]
pub struct PackageStatusResponse {
    pub package_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
