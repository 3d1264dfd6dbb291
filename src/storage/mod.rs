//! Object storage for completed attempt snapshots.

pub mod fs;
pub mod http;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, SnapshotStoreConfig};
use crate::error::Result;
use crate::models::test_attempt::SNAPSHOT_POINTER_PREFIX;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

const SNAPSHOT_PREFIX: &str = "snapshots";

/// Identifies one attempt snapshot: `snapshots/{student}/{test}/{attempt}.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub attempt_id: Uuid,
}

impl SnapshotKey {
    pub fn new(student_id: Uuid, test_id: Uuid, attempt_id: Uuid) -> Self {
        Self {
            student_id,
            test_id,
            attempt_id,
        }
    }

    pub fn object_path(&self) -> String {
        format!(
            "{}/{}.json",
            listing_prefix(self.student_id, self.test_id),
            self.attempt_id
        )
    }

    pub fn parse(path: &str) -> Option<Self> {
        let mut parts = path.split('/');
        if parts.next()? != SNAPSHOT_PREFIX {
            return None;
        }
        let student_id = parts.next()?.parse().ok()?;
        let test_id = parts.next()?.parse().ok()?;
        let attempt_id = attempt_id_from_file_name(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(student_id, test_id, attempt_id))
    }

    /// The value written into `attempt_snapshot` once the object is stored.
    pub fn pointer(&self, bucket: &str) -> String {
        format!("{}{}/{}", SNAPSHOT_POINTER_PREFIX, bucket, self.object_path())
    }

    /// Splits a pointer back into bucket and key.
    pub fn from_pointer(pointer: &str) -> Option<(String, Self)> {
        let rest = pointer.strip_prefix(SNAPSHOT_POINTER_PREFIX)?;
        let (bucket, path) = rest.split_once('/')?;
        if bucket.is_empty() {
            return None;
        }
        Some((bucket.to_string(), Self::parse(path)?))
    }
}

/// Folder holding every snapshot of one student for one test, without a trailing slash.
pub fn listing_prefix(student_id: Uuid, test_id: Uuid) -> String {
    format!("{}/{}/{}", SNAPSHOT_PREFIX, student_id, test_id)
}

/// `"{uuid}.json"` to the attempt id; anything else (metadata sidecars, stray files) is skipped.
pub fn attempt_id_from_file_name(name: &str) -> Option<Uuid> {
    name.strip_suffix(".json")?.parse().ok()
}

/// Stored next to every snapshot object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub date: Option<NaiveDate>,
    pub attempt_version: Option<String>,
}

#[async_trait]
pub trait SnapshotObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Stores `content` and returns the object path it was written under.
    async fn upload_snapshot(
        &self,
        key: &SnapshotKey,
        content: &str,
        metadata: &SnapshotMetadata,
    ) -> Result<String>;

    /// `None` when the object does not exist.
    async fn download_snapshot(&self, key: &SnapshotKey) -> Result<Option<String>>;

    /// Deleting a missing object is not an error.
    async fn delete_snapshot(&self, key: &SnapshotKey) -> Result<()>;

    async fn list_snapshots(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>>;
}

pub fn build_object_store(config: &Config) -> Result<Option<Arc<dyn SnapshotObjectStore>>> {
    let store: Arc<dyn SnapshotObjectStore> = match &config.snapshot_store {
        SnapshotStoreConfig::Disabled => return Ok(None),
        SnapshotStoreConfig::Filesystem { root } => {
            Arc::new(FsObjectStore::new(root.clone(), config.snapshot_bucket.clone()))
        }
        SnapshotStoreConfig::Http { endpoint, token } => Arc::new(HttpObjectStore::new(
            endpoint,
            config.snapshot_bucket.clone(),
            token.clone(),
        )?),
    };
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_round_trips_through_parse() {
        let key = SnapshotKey::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let pointer = key.pointer("test-attempts");
        assert!(pointer.starts_with("objstore://test-attempts/snapshots/"));

        let (bucket, parsed) = SnapshotKey::from_pointer(&pointer).unwrap();
        assert_eq!(bucket, "test-attempts");
        assert_eq!(parsed, key);
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(SnapshotKey::parse("snapshots/not-a-uuid/x/y.json").is_none());
        assert!(SnapshotKey::from_pointer("{\"answers\":[]}").is_none());
        assert!(SnapshotKey::from_pointer("objstore:///snapshots/a/b/c.json").is_none());
    }

    #[test]
    fn sidecar_names_are_not_attempts() {
        let id = Uuid::new_v4();
        assert_eq!(attempt_id_from_file_name(&format!("{}.json", id)), Some(id));
        assert_eq!(attempt_id_from_file_name(&format!("{}.meta.json", id)), None);
    }
}
