use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{SnapshotKey, SnapshotMetadata, SnapshotObjectStore};

/// Object store kept in memory. `set_failing(true)` makes every call fail, which is how
/// callers exercise their fallback paths.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Arc<RwLock<HashMap<SnapshotKey, (String, SnapshotMetadata)>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn metadata(&self, key: &SnapshotKey) -> Option<SnapshotMetadata> {
        self.objects.read().await.get(key).map(|(_, m)| m.clone())
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("object store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_snapshot(
        &self,
        key: &SnapshotKey,
        content: &str,
        metadata: &SnapshotMetadata,
    ) -> Result<String> {
        self.check()?;
        self.objects
            .write()
            .await
            .insert(*key, (content.to_string(), metadata.clone()));
        Ok(key.object_path())
    }

    async fn download_snapshot(&self, key: &SnapshotKey) -> Result<Option<String>> {
        self.check()?;
        Ok(self.objects.read().await.get(key).map(|(c, _)| c.clone()))
    }

    async fn delete_snapshot(&self, key: &SnapshotKey) -> Result<()> {
        self.check()?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list_snapshots(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>> {
        self.check()?;
        let mut ids: Vec<Uuid> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.student_id == student_id && k.test_id == test_id)
            .map(|k| k.attempt_id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
