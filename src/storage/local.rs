use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::LocalStorageConfig;
use crate::storage::provider::{
    validate_key, ObjectInfo, ObjectStorage, PartEtag, PutResult, StorageError, StorageResult,
};
use crate::storage::signer::UrlSigner;

/// Spool directory for in-flight multipart uploads, kept out of listings
const MULTIPART_DIR: &str = ".multipart";

/// Local file system storage backend. Presigned URLs point back at the
/// application's blob endpoint and carry an HMAC signature.
pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: String,
    signer: UrlSigner,
}

impl LocalStorage {
    pub fn new(config: LocalStorageConfig) -> Self {
        Self {
            base_path: PathBuf::from(config.base_path),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            signer: UrlSigner::new(config.url_secret),
        }
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    fn multipart_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(MULTIPART_DIR).join(upload_id)
    }

    fn signed_url(&self, method: &str, key: &str, ttl: Duration) -> String {
        let expires = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signer.sign(method, key, expires);
        // Keys are service-generated (uuid-based paths), nothing to escape
        format!(
            "{}/api/v1/blob/{}?expires={}&signature={}",
            self.public_base_url, key, expires, signature
        )
    }

    async fn write_file(&self, path: &PathBuf, data: &Bytes) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        file.write_all(data)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

fn etag_of(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|x| format!("{:02x}", x))
        .collect()
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> StorageResult<PutResult> {
        validate_key(key)?;
        let path = self.object_path(key);
        self.write_file(&path, &data).await?;
        tracing::debug!("Saved object to {:?}", path);
        Ok(PutResult {
            etag: etag_of(&data),
        })
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        let path = self.object_path(key);

        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Unavailable(e.to_string())
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn presigned_put_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.signed_url("put", key, ttl))
    }

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.signed_url("get", key, ttl))
    }

    async fn init_multipart(
        &self,
        key: &str,
        _content_type: Option<&str>,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        let dir = self.multipart_dir(&upload_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        // Remember the destination key so complete() does not have to trust
        // the caller's pairing of key and upload id.
        fs::write(dir.join(".key"), key)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(upload_id)
    }

    async fn presigned_part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let part_key = format!("{}/{}/{:05}", MULTIPART_DIR, upload_id, part_number);
        Ok(self.signed_url("put", &part_key, ttl))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<PartEtag> {
        validate_key(key)?;
        if part_number < 1 {
            return Err(StorageError::InvalidKey(format!(
                "part number {} out of range",
                part_number
            )));
        }
        let dir = self.multipart_dir(upload_id);
        if !dir.exists() {
            return Err(StorageError::NotFound(format!("upload {}", upload_id)));
        }
        let path = dir.join(format!("{:05}", part_number));
        self.write_file(&path, &data).await?;
        Ok(PartEtag {
            part_number,
            etag: etag_of(&data),
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartEtag],
    ) -> StorageResult<()> {
        validate_key(key)?;
        let dir = self.multipart_dir(upload_id);
        if !dir.exists() {
            return Err(StorageError::NotFound(format!("upload {}", upload_id)));
        }
        let recorded_key = fs::read_to_string(dir.join(".key"))
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        if recorded_key != key {
            return Err(StorageError::InvalidKey(format!(
                "upload {} was initiated for a different key",
                upload_id
            )));
        }

        let mut ordered: Vec<&PartEtag> = parts.iter().collect();
        ordered.sort_by_key(|p| p.part_number);

        let mut assembled = Vec::new();
        for part in ordered {
            let part_path = dir.join(format!("{:05}", part.part_number));
            let data = fs::read(&part_path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound(format!(
                        "part {} of upload {}",
                        part.part_number, upload_id
                    ))
                } else {
                    StorageError::Unavailable(e.to_string())
                }
            })?;
            assembled.extend_from_slice(&data);
        }

        let path = self.object_path(key);
        self.write_file(&path, &Bytes::from(assembled)).await?;

        let _ = fs::remove_dir_all(&dir).await;
        tracing::debug!("Completed multipart upload {} -> {:?}", upload_id, path);
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        let dir = self.multipart_dir(upload_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn copy(&self, src_key: &str, dest_key: &str) -> StorageResult<()> {
        validate_key(src_key)?;
        validate_key(dest_key)?;
        let src = self.object_path(src_key);
        let dest = self.object_path(dest_key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }
        fs::copy(&src, &dest).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(src_key.to_string())
            } else {
                StorageError::Unavailable(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let path = self.object_path(key);

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted object {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.object_path(key).exists())
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut results = Vec::new();
        let mut stack = vec![self.base_path.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Unavailable(e.to_string())),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))?
            {
                let path = entry.path();
                let rel = match path.strip_prefix(&self.base_path) {
                    Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                    Err(_) => continue,
                };
                if rel.starts_with(MULTIPART_DIR) {
                    continue;
                }
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                if meta.is_dir() {
                    stack.push(path);
                } else if rel.starts_with(prefix) {
                    let last_modified = meta
                        .modified()
                        .ok()
                        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());
                    results.push(ObjectInfo {
                        key: rel,
                        size: meta.len(),
                        last_modified,
                    });
                }
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
