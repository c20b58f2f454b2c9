//! Durable local storage for queued submissions.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::db;
use crate::error::StorageError;
use crate::models::{EntryPatch, QueueEntry};

/// Persistence for one named queue.
///
/// Each call is individually atomic. Nothing here spans entries.
#[async_trait]
pub trait QueueStore: Send + Sync {
    fn name(&self) -> &str;

    /// Persist a new entry with zero attempts and return its id.
    async fn add(
        &self,
        payload: &Value,
        created_at: i64,
        next_attempt: i64,
    ) -> Result<i64, StorageError>;

    async fn list(&self) -> Result<Vec<QueueEntry<Value>>, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<QueueEntry<Value>>, StorageError>;

    /// Missing ids are not an error: the entry may have been delivered or
    /// removed in the meantime.
    async fn update(&self, id: i64, patch: EntryPatch) -> Result<(), StorageError>;

    /// Idempotent. Returns whether an entry was actually deleted.
    async fn remove(&self, id: i64) -> Result<bool, StorageError>;

    async fn count(&self) -> Result<i64, StorageError>;

    async fn count_failing(&self) -> Result<i64, StorageError>;
}

/// SQLite-backed store. Several stores may share one pool; rows are
/// partitioned by queue name.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    queue: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    fn name(&self) -> &str {
        &self.queue
    }

    async fn add(
        &self,
        payload: &Value,
        created_at: i64,
        next_attempt: i64,
    ) -> Result<i64, StorageError> {
        let payload = serde_json::to_string(payload).map_err(StorageError::Encode)?;
        let id = db::queue_entries::insert(
            &self.pool,
            &self.queue,
            &payload,
            created_at,
            next_attempt,
        )
        .await?;
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<QueueEntry<Value>>, StorageError> {
        Ok(db::queue_entries::list(&self.pool, &self.queue)
            .await?
            .into_iter()
            .map(QueueEntry::from)
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<QueueEntry<Value>>, StorageError> {
        Ok(db::queue_entries::find_by_id(&self.pool, &self.queue, id)
            .await?
            .map(QueueEntry::from))
    }

    async fn update(&self, id: i64, patch: EntryPatch) -> Result<(), StorageError> {
        db::queue_entries::update(
            &self.pool,
            &self.queue,
            id,
            patch.attempts.map(i64::from),
            patch.next_attempt,
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, id: i64) -> Result<bool, StorageError> {
        Ok(db::queue_entries::delete(&self.pool, &self.queue, id).await?)
    }

    async fn count(&self) -> Result<i64, StorageError> {
        Ok(db::queue_entries::count(&self.pool, &self.queue).await?)
    }

    async fn count_failing(&self) -> Result<i64, StorageError> {
        Ok(db::queue_entries::count_failing(&self.pool, &self.queue).await?)
    }
}
