pub mod local;
#[cfg(test)]
pub mod memory;
pub mod provider;
pub mod s3;
pub mod signer;

pub use provider::{
    validate_key, ObjectInfo, ObjectStorage, PartEtag, PutResult, StorageError, StorageResult,
};

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::storage::local::LocalStorage;
use crate::storage::s3::S3Storage;

/// Build the configured storage backend. Selection happens once at startup;
/// everything downstream sees only the trait object.
pub async fn build_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    match config.backend.as_str() {
        "s3" => {
            if config.s3.bucket.is_empty() {
                anyhow::bail!("storage.s3.bucket must be set for the s3 backend");
            }
            Ok(Arc::new(S3Storage::new(&config.s3).await))
        }
        "local" => Ok(Arc::new(LocalStorage::new(config.local.clone()))),
        other => anyhow::bail!("unknown storage backend: {}", other),
    }
}
