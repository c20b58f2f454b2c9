//! Type-erased access to the hosted queues, keyed by store name.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::delivery::{Delivery, Payload};
use crate::error::QueueError;
use crate::models::{Envelope, QueueEntry};
use crate::queue::{FlushOutcome, QueueSnapshot, RetryOutcome, SubmissionQueue, SubmitOutcome};

/// The JSON-level face of a `SubmissionQueue`, used by the control API and
/// the background worker.
#[async_trait]
pub trait QueueHandle: Send + Sync {
    fn name(&self) -> &str;
    fn sync_tag(&self) -> &str;

    async fn submit_json(
        &self,
        auth_token: Option<String>,
        body: Value,
    ) -> Result<SubmitOutcome, QueueError>;
    async fn flush(&self) -> Result<FlushOutcome, QueueError>;
    async fn retry(&self, id: i64) -> Result<RetryOutcome, QueueError>;
    async fn remove(&self, id: i64) -> Result<bool, QueueError>;
    async fn entries(&self) -> Result<Vec<QueueEntry<Value>>, QueueError>;
    async fn snapshot(&self) -> Result<QueueSnapshot, QueueError>;
}

#[async_trait]
impl<P: Payload, D: Delivery<P>> QueueHandle for SubmissionQueue<P, D> {
    fn name(&self) -> &str {
        SubmissionQueue::name(self)
    }

    fn sync_tag(&self) -> &str {
        self.tag()
    }

    async fn submit_json(
        &self,
        auth_token: Option<String>,
        body: Value,
    ) -> Result<SubmitOutcome, QueueError> {
        let body: P = serde_json::from_value(body)?;
        self.submit(Envelope { auth_token, body }).await
    }

    async fn flush(&self) -> Result<FlushOutcome, QueueError> {
        SubmissionQueue::flush(self).await
    }

    async fn retry(&self, id: i64) -> Result<RetryOutcome, QueueError> {
        SubmissionQueue::retry(self, id).await
    }

    async fn remove(&self, id: i64) -> Result<bool, QueueError> {
        SubmissionQueue::remove(self, id).await
    }

    async fn entries(&self) -> Result<Vec<QueueEntry<Value>>, QueueError> {
        self.list_raw().await
    }

    async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        SubmissionQueue::snapshot(self).await
    }
}

#[derive(Default)]
pub struct QueueRegistry {
    queues: BTreeMap<String, Arc<dyn QueueHandle>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, queue: Arc<dyn QueueHandle>) {
        self.queues.insert(queue.name().to_string(), queue);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn QueueHandle>> {
        self.queues.get(name)
    }

    pub fn by_sync_tag(&self, tag: &str) -> Option<&Arc<dyn QueueHandle>> {
        self.queues.values().find(|queue| queue.sync_tag() == tag)
    }

    pub fn list(&self) -> Vec<&Arc<dyn QueueHandle>> {
        self.queues.values().collect()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
