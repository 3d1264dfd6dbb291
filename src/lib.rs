pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::database::{
    AttemptStore, ContentStore, MemoryAttemptStore, MemoryContentStore, PgAttemptStore,
    PgContentStore,
};
use crate::error::Result;
use crate::services::{
    answer_service::AnswerService, attempt_service::AttemptService,
    draft_service::DraftService, snapshot_service::SnapshotService, test_service::TestService,
};
use crate::storage::{build_object_store, SnapshotObjectStore};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub test_service: TestService,
    pub draft_service: DraftService,
    pub attempt_service: AttemptService,
    pub answer_service: AnswerService,
    pub snapshot_service: SnapshotService,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Result<Self> {
        let content: Arc<dyn ContentStore> = Arc::new(PgContentStore::new(pool.clone()));
        let attempts: Arc<dyn AttemptStore> = Arc::new(PgAttemptStore::new(pool));
        let object_store = build_object_store(config)?;
        Ok(Self::from_parts(
            content,
            attempts,
            object_store,
            config.snapshot_inline_max_bytes,
        ))
    }

    /// Keeps tests, drafts and attempts in process memory. Nothing survives a restart.
    pub fn in_memory(config: &Config) -> Result<Self> {
        Ok(Self::from_parts(
            Arc::new(MemoryContentStore::new()),
            Arc::new(MemoryAttemptStore::new()),
            build_object_store(config)?,
            config.snapshot_inline_max_bytes,
        ))
    }

    /// Wires the services over any store implementation.
    pub fn from_parts(
        content: Arc<dyn ContentStore>,
        attempts: Arc<dyn AttemptStore>,
        object_store: Option<Arc<dyn SnapshotObjectStore>>,
        inline_max_bytes: Option<usize>,
    ) -> Self {
        Self {
            test_service: TestService::new(content.clone()),
            draft_service: DraftService::new(content.clone()),
            attempt_service: AttemptService::new(content, attempts.clone()),
            answer_service: AnswerService::new(attempts.clone()),
            snapshot_service: SnapshotService::new(attempts, object_store, inline_max_bytes),
        }
    }
}
