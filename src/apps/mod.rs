//! The three hosted applications. Each is a payload type plus the settings
//! its queue runs with.

pub mod crm;
pub mod estimating;
pub mod field_reports;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::background_sync::BackgroundSync;
use crate::backoff::BackoffPolicy;
use crate::clock::{Clock, SystemClock};
use crate::connectivity::Connectivity;
use crate::delivery::{Delivery, Payload};
use crate::queue::SubmissionQueue;
use crate::store::SqliteStore;

/// A file carried inline in a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// `data:<mime>;base64,<bytes>`
    pub blob: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Client-side idempotency key for a submission.
pub fn new_submission_id() -> String {
    Uuid::now_v7().to_string()
}

/// Everything a queue needs besides its store and transport.
#[derive(Clone)]
pub struct QueueDeps {
    pub connectivity: Connectivity,
    pub clock: Arc<dyn Clock>,
    pub backoff: BackoffPolicy,
    pub delivery_timeout: Duration,
    pub background_sync: Option<Arc<dyn BackgroundSync>>,
}

impl QueueDeps {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            clock: Arc::new(SystemClock),
            backoff: BackoffPolicy::default(),
            delivery_timeout: Duration::from_secs(30),
            background_sync: None,
        }
    }
}

/// Static settings distinguishing one application's queue from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppQueueSettings {
    pub store_name: &'static str,
    pub sync_tag: &'static str,
    pub ordered: bool,
    /// Merged into every delivered body as `"action"`.
    pub action: Option<&'static str>,
}

impl AppQueueSettings {
    pub fn build<P: Payload, D: Delivery<P>>(
        &self,
        pool: SqlitePool,
        delivery: D,
        deps: QueueDeps,
    ) -> SubmissionQueue<P, D> {
        let store = Arc::new(SqliteStore::new(pool, self.store_name));
        let queue = SubmissionQueue::new(store, delivery, deps.connectivity)
            .ordered(self.ordered)
            .sync_tag(self.sync_tag)
            .clock(deps.clock)
            .backoff(deps.backoff)
            .delivery_timeout(deps.delivery_timeout);

        match deps.background_sync {
            Some(sync) => queue.background_sync(sync),
            None => queue,
        }
    }
}
