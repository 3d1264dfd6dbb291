//! Snapshot objects as files under `{root}/{bucket}/snapshots/...`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::{
    attempt_id_from_file_name, listing_prefix, SnapshotKey, SnapshotMetadata, SnapshotObjectStore,
};

pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    fn object_file(&self, key: &SnapshotKey) -> PathBuf {
        self.root.join(&self.bucket).join(key.object_path())
    }

    fn metadata_file(&self, key: &SnapshotKey) -> PathBuf {
        self.object_file(key).with_extension("meta.json")
    }
}

/// Writes through a temp file in the same directory and renames it into place.
async fn atomic_write(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp = target.with_extension("tmp");
    fs::write(&temp, content).await?;
    fs::rename(&temp, target).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SnapshotObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_snapshot(
        &self,
        key: &SnapshotKey,
        content: &str,
        metadata: &SnapshotMetadata,
    ) -> Result<String> {
        let meta = serde_json::to_vec(metadata)?;
        atomic_write(&self.metadata_file(key), &meta).await?;
        atomic_write(&self.object_file(key), content.as_bytes()).await?;
        Ok(key.object_path())
    }

    async fn download_snapshot(&self, key: &SnapshotKey) -> Result<Option<String>> {
        match fs::read_to_string(self.object_file(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_snapshot(&self, key: &SnapshotKey) -> Result<()> {
        remove_if_exists(&self.object_file(key)).await?;
        remove_if_exists(&self.metadata_file(key)).await
    }

    async fn list_snapshots(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>> {
        let dir = self
            .root
            .join(&self.bucket)
            .join(listing_prefix(student_id, test_id));
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry.file_name().to_str().and_then(attempt_id_from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
