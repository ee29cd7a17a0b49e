//! In-memory storage backend used by the service tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::storage::provider::{
    validate_key, ObjectInfo, ObjectStorage, PartEtag, PutResult, StorageError, StorageResult,
};

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    multiparts: Mutex<HashMap<String, (String, BTreeMap<i32, Bytes>)>>,
    fail_presign: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every presign call fail, for compensation-path tests
    pub fn set_fail_presign(&self, fail: bool) {
        self.fail_presign.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail with Unavailable
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::copy_from_slice(data));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn open_multipart_count(&self) -> usize {
        self.multiparts.lock().unwrap().len()
    }

    fn check_up(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn check_presign(&self) -> StorageResult<()> {
        self.check_up()?;
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "simulated presign failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> StorageResult<PutResult> {
        validate_key(key)?;
        self.check_up()?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(PutResult {
            etag: format!("mem-{}", key.len()),
        })
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.check_up()?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn presigned_put_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        self.check_presign()?;
        Ok(format!("memory://put/{}?ttl={}", key, ttl.as_secs()))
    }

    async fn presigned_get_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        self.check_presign()?;
        Ok(format!("memory://get/{}?ttl={}", key, ttl.as_secs()))
    }

    async fn init_multipart(
        &self,
        key: &str,
        _content_type: Option<&str>,
    ) -> StorageResult<String> {
        validate_key(key)?;
        self.check_up()?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.multiparts
            .lock()
            .unwrap()
            .insert(upload_id.clone(), (key.to_string(), BTreeMap::new()));
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
        self.check_presign()?;
        Ok(format!(
            "memory://part/{}/{}/{}?ttl={}",
            key,
            upload_id,
            part_number,
            ttl.as_secs()
        ))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<PartEtag> {
        validate_key(key)?;
        self.check_up()?;
        let mut multiparts = self.multiparts.lock().unwrap();
        let (_, parts) = multiparts
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("upload {}", upload_id)))?;
        parts.insert(part_number, data);
        Ok(PartEtag {
            part_number,
            etag: format!("mem-part-{}", part_number),
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        _parts: &[PartEtag],
    ) -> StorageResult<()> {
        validate_key(key)?;
        self.check_up()?;
        let (recorded_key, parts) = self
            .multiparts
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("upload {}", upload_id)))?;
        if recorded_key != key {
            return Err(StorageError::InvalidKey(format!(
                "upload {} was initiated for a different key",
                upload_id
            )));
        }
        let mut assembled = Vec::new();
        for data in parts.values() {
            assembled.extend_from_slice(data);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from(assembled));
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        self.check_up()?;
        self.multiparts.lock().unwrap().remove(upload_id);
        Ok(())
    }

    async fn copy(&self, src_key: &str, dest_key: &str) -> StorageResult<()> {
        validate_key(src_key)?;
        validate_key(dest_key)?;
        self.check_up()?;
        let mut objects = self.objects.lock().unwrap();
        let data = objects
            .get(src_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(src_key.to_string()))?;
        objects.insert(dest_key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.check_up()?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.check_up()?;
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        self.check_up()?;
        let objects = self.objects.lock().unwrap();
        let mut results: Vec<ObjectInfo> = objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectInfo {
                key: k.clone(),
                size: v.len() as u64,
                last_modified: None,
            })
            .collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
