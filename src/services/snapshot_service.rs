use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::AttemptStore;
use crate::error::{Error, Result};
use crate::models::test_attempt::{TestAttempt, SNAPSHOT_POINTER_PREFIX};
use crate::storage::{SnapshotKey, SnapshotMetadata, SnapshotObjectStore};
use crate::utils::time::today;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotLocation {
    Inline,
    ObjectStore,
}

/// Decides where a completed attempt's snapshot lives: inline in the attempt record or in the
/// object store with only a pointer kept in the record.
#[derive(Clone)]
pub struct SnapshotService {
    attempts: Arc<dyn AttemptStore>,
    object_store: Option<Arc<dyn SnapshotObjectStore>>,
    inline_max_bytes: Option<usize>,
}

fn key_of(attempt: &TestAttempt) -> SnapshotKey {
    SnapshotKey::new(attempt.student_id, attempt.test_id, attempt.id)
}

impl SnapshotService {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        object_store: Option<Arc<dyn SnapshotObjectStore>>,
        inline_max_bytes: Option<usize>,
    ) -> Self {
        Self {
            attempts,
            object_store,
            inline_max_bytes,
        }
    }

    /// Never loses the snapshot: any upload failure degrades to inline storage. Metadata the
    /// caller leaves empty is taken from the attempt record, and the date defaults to today.
    pub async fn save(
        &self,
        attempt_id: Uuid,
        snapshot: &str,
        supplied: SnapshotMetadata,
    ) -> Result<SnapshotLocation> {
        if snapshot.starts_with(SNAPSHOT_POINTER_PREFIX) {
            return Err(Error::validation(format!(
                "snapshot content must not start with {}",
                SNAPSHOT_POINTER_PREFIX
            )));
        }
        let attempt = self.attempts.get_attempt(attempt_id).await?;

        let store = match &self.object_store {
            Some(store) if !self.fits_inline(snapshot) => store,
            _ => return self.save_inline(attempt_id, snapshot).await,
        };

        let key = key_of(&attempt);
        let metadata = SnapshotMetadata {
            date: supplied.date.or(attempt.date_of_attempt).or_else(|| Some(today())),
            attempt_version: supplied
                .attempt_version
                .or_else(|| attempt.attempt_version.as_ref().map(|v| v.to_string())),
        };
        match store.upload_snapshot(&key, snapshot, &metadata).await {
            Ok(path) => {
                let pointer = key.pointer(store.bucket());
                self.attempts.set_snapshot(attempt_id, &pointer).await?;
                info!(attempt_id = %attempt_id, path = %path, "snapshot stored in object store");
                Ok(SnapshotLocation::ObjectStore)
            }
            Err(e) => {
                warn!(attempt_id = %attempt_id, error = %e, "snapshot upload failed, storing inline");
                self.save_inline(attempt_id, snapshot).await
            }
        }
    }

    fn fits_inline(&self, snapshot: &str) -> bool {
        self.inline_max_bytes
            .map(|max| snapshot.len() <= max)
            .unwrap_or(false)
    }

    async fn save_inline(&self, attempt_id: Uuid, snapshot: &str) -> Result<SnapshotLocation> {
        self.attempts.set_snapshot(attempt_id, snapshot).await?;
        Ok(SnapshotLocation::Inline)
    }

    /// The snapshot content, following a pointer into the object store when there is one.
    pub async fn load(&self, attempt_id: Uuid) -> Result<Option<String>> {
        let attempt = self.attempts.get_attempt(attempt_id).await?;
        let stored = match &attempt.attempt_snapshot {
            Some(stored) => stored,
            None => return Ok(None),
        };
        if !attempt.snapshot_is_pointer() {
            return Ok(Some(stored.clone()));
        }

        let (bucket, key) = SnapshotKey::from_pointer(stored).ok_or_else(|| {
            Error::Internal(format!("attempt {} has a malformed snapshot pointer", attempt_id))
        })?;
        let store = self.object_store.as_ref().ok_or_else(|| {
            Error::StorageUnavailable("snapshot is in object storage but none is configured".into())
        })?;
        // A pointer may only ever name this attempt's own object.
        if key != key_of(&attempt) || bucket != store.bucket() {
            warn!(attempt_id = %attempt_id, "snapshot pointer names a foreign object");
            return Err(Error::Internal(format!(
                "attempt {} has a snapshot pointer to another object",
                attempt_id
            )));
        }
        match store.download_snapshot(&key).await {
            Ok(Some(content)) => Ok(Some(content)),
            Ok(None) => Err(Error::StorageUnavailable(format!(
                "snapshot object {} is missing",
                key.object_path()
            ))),
            Err(e) => {
                warn!(attempt_id = %attempt_id, error = %e, "snapshot download failed");
                Err(Error::StorageUnavailable(format!(
                    "snapshot for attempt {} could not be fetched",
                    attempt_id
                )))
            }
        }
    }

    /// Removes the attempt. The object-store delete is best effort.
    pub async fn delete(&self, attempt_id: Uuid) -> Result<()> {
        let attempt = self.attempts.get_attempt(attempt_id).await?;
        if attempt.snapshot_is_pointer() {
            if let Some(store) = &self.object_store {
                if let Err(e) = store.delete_snapshot(&key_of(&attempt)).await {
                    warn!(attempt_id = %attempt_id, error = %e, "snapshot delete failed, removing record anyway");
                }
            }
        }
        self.attempts.delete_attempt(attempt_id).await?;
        info!(attempt_id = %attempt_id, "attempt deleted");
        Ok(())
    }

    /// Attempt ids with a stored snapshot, inline or in the object store. A failing object
    /// store only costs its own entries.
    pub async fn list(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>> {
        let mut ids = self.attempts.snapshot_attempt_ids(student_id, test_id).await?;
        if let Some(store) = &self.object_store {
            match store.list_snapshots(student_id, test_id).await {
                Ok(stored) => ids.extend(stored),
                Err(e) => {
                    warn!(student_id = %student_id, test_id = %test_id, error = %e, "snapshot listing failed, using attempt records")
                }
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
