//! The offline submission queue.
//!
//! A submission is delivered immediately when the device is online and only
//! persisted when that attempt fails or the device is offline. Persisted
//! entries are retried by flush passes with capped exponential backoff until a
//! delivery succeeds or the user removes them.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::background_sync::BackgroundSync;
use crate::backoff::BackoffPolicy;
use crate::clock::{Clock, SystemClock};
use crate::connectivity::Connectivity;
use crate::delivery::{Delivery, Payload};
use crate::error::{DeliveryError, QueueError, RegistrationError, StorageError};
use crate::models::{EntryPatch, Envelope, QueueEntry};
use crate::store::QueueStore;

const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Idle,
    Syncing,
}

/// What a status indicator shows for one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub state: QueueState,
    pub pending: i64,
    pub failing: i64,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Delivered,
    Queued { id: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    pub waiting: usize,
    /// An ordered queue stopped before reaching the end.
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushOutcome {
    Offline,
    AlreadyRunning,
    Completed(FlushReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetryOutcome {
    Delivered,
    #[serde(rename_all = "camelCase")]
    Rescheduled { attempts: u32, next_attempt: i64 },
    NotFound,
    AlreadyRunning,
}

/// Result of one attempt on a stored entry.
enum Attempt {
    Delivered,
    Failed { attempts: u32, next_attempt: i64 },
}

/// Releases the in-progress flag even if a pass bails out early.
struct PassGuard<'a> {
    flushing: &'a AtomicBool,
    status: &'a watch::Sender<QueueState>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flushing.store(false, Ordering::Release);
        self.status.send_replace(QueueState::Idle);
    }
}

/// A durable queue of `P` submissions delivered through `D`.
pub struct SubmissionQueue<P, D> {
    store: Arc<dyn QueueStore>,
    delivery: D,
    connectivity: Connectivity,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    ordered: bool,
    delivery_timeout: Duration,
    sync_tag: String,
    background_sync: Option<Arc<dyn BackgroundSync>>,
    flushing: AtomicBool,
    status: watch::Sender<QueueState>,
    _payload: PhantomData<fn() -> P>,
}

impl<P, D> std::fmt::Debug for SubmissionQueue<P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionQueue")
            .field("name", &self.store.name())
            .field("ordered", &self.ordered)
            .field("backoff", &self.backoff)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("sync_tag", &self.sync_tag)
            .finish()
    }
}

impl<P: Payload, D: Delivery<P>> SubmissionQueue<P, D> {
    /// The sync tag defaults to `<store name>-sync`.
    pub fn new(store: Arc<dyn QueueStore>, delivery: D, connectivity: Connectivity) -> Self {
        let sync_tag = format!("{}-sync", store.name());
        let (status, _rx) = watch::channel(QueueState::Idle);
        Self {
            store,
            delivery,
            connectivity,
            clock: Arc::new(SystemClock),
            backoff: BackoffPolicy::default(),
            ordered: false,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            sync_tag,
            background_sync: None,
            flushing: AtomicBool::new(false),
            status,
            _payload: PhantomData,
        }
    }

    /// Stop each flush pass at the first failure, and queue new submissions
    /// behind any backlog, so later entries never land before earlier ones.
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Hard limit on a single delivery attempt.
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.sync_tag = tag.into();
        self
    }

    pub fn background_sync(mut self, sync: Arc<dyn BackgroundSync>) -> Self {
        self.background_sync = Some(sync);
        self
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn tag(&self) -> &str {
        &self.sync_tag
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Deliver now if possible, otherwise persist for a later flush.
    ///
    /// Storage failures are returned: the caller must not report the
    /// submission as saved.
    pub async fn submit(&self, envelope: Envelope<P>) -> Result<SubmitOutcome, QueueError> {
        if self.ordered && self.connectivity.is_online() && self.store.count().await? > 0 {
            return self.submit_behind_backlog(&envelope).await;
        }

        let next_attempt = if self.connectivity.is_online() {
            match self.attempt(&envelope).await {
                Ok(()) => {
                    tracing::debug!("Delivered {} submission without queueing", self.name());
                    return Ok(SubmitOutcome::Delivered);
                }
                Err(e) => {
                    tracing::warn!("Online send for {} failed, queueing: {e}", self.name());
                    self.backoff.next_attempt(self.clock.now_ms(), 0)
                }
            }
        } else {
            self.clock.now_ms()
        };

        let id = self.persist(&envelope, next_attempt).await?;
        self.register_background_sync();

        Ok(SubmitOutcome::Queued { id })
    }

    /// An ordered queue with a backlog must not let a new submission overtake
    /// it: store it at the back and run a pass.
    async fn submit_behind_backlog(
        &self,
        envelope: &Envelope<P>,
    ) -> Result<SubmitOutcome, QueueError> {
        let id = self.persist(envelope, self.clock.now_ms()).await?;
        self.register_background_sync();

        if let Err(e) = self.flush().await {
            tracing::warn!("Flush of {} after submit failed: {e}", self.name());
        }

        match self.store.get(id).await {
            Ok(None) => Ok(SubmitOutcome::Delivered),
            Ok(Some(_)) => Ok(SubmitOutcome::Queued { id }),
            Err(e) => {
                tracing::warn!("Could not check {} submission {id}: {e}", self.name());
                Ok(SubmitOutcome::Queued { id })
            }
        }
    }

    /// Persist a submission as immediately eligible without attempting it.
    pub async fn enqueue(&self, envelope: Envelope<P>) -> Result<i64, QueueError> {
        let id = self.persist(&envelope, self.clock.now_ms()).await?;
        self.register_background_sync();
        Ok(id)
    }

    /// Attempt every eligible entry once.
    pub async fn flush(&self) -> Result<FlushOutcome, QueueError> {
        let Some(_guard) = self.begin_pass() else {
            tracing::debug!("Flush of {} already in progress", self.name());
            return Ok(FlushOutcome::AlreadyRunning);
        };

        if !self.connectivity.is_online() {
            tracing::debug!("Skipping flush of {}: offline", self.name());
            return Ok(FlushOutcome::Offline);
        }

        let entries = self.store.list().await?;
        if entries.is_empty() {
            return Ok(FlushOutcome::Completed(FlushReport::default()));
        }

        tracing::info!("Syncing {} queued {} submission(s)", entries.len(), self.name());

        let mut report = FlushReport::default();
        for entry in entries {
            if !entry.is_eligible(self.clock.now_ms()) {
                report.waiting += 1;
                if self.ordered {
                    report.aborted = true;
                    break;
                }
                continue;
            }

            match self.attempt_entry(entry).await? {
                Attempt::Delivered => report.delivered += 1,
                Attempt::Failed { .. } => {
                    report.failed += 1;
                    if self.ordered {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        tracing::info!(
            "Flush of {} finished: {} delivered, {} failed, {} waiting",
            self.name(),
            report.delivered,
            report.failed,
            report.waiting
        );

        Ok(FlushOutcome::Completed(report))
    }

    /// Attempt one entry now, ignoring its backoff timer.
    pub async fn retry(&self, id: i64) -> Result<RetryOutcome, QueueError> {
        let Some(_guard) = self.begin_pass() else {
            return Ok(RetryOutcome::AlreadyRunning);
        };

        let Some(entry) = self.store.get(id).await? else {
            return Ok(RetryOutcome::NotFound);
        };

        Ok(match self.attempt_entry(entry).await? {
            Attempt::Delivered => RetryOutcome::Delivered,
            Attempt::Failed {
                attempts,
                next_attempt,
            } => RetryOutcome::Rescheduled {
                attempts,
                next_attempt,
            },
        })
    }

    /// Drop a queued submission without delivering it. Idempotent; returns
    /// whether the entry existed.
    pub async fn remove(&self, id: i64) -> Result<bool, QueueError> {
        let removed = self.store.remove(id).await?;
        if removed {
            tracing::info!("Dropped {} submission {id}", self.name());
        } else {
            tracing::debug!("No {} submission {id} to drop", self.name());
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<QueueEntry<Envelope<P>>>, QueueError> {
        self.store
            .list()
            .await?
            .into_iter()
            .map(decode_entry)
            .collect::<Result<Vec<_>, _>>()
            .map_err(QueueError::from)
    }

    /// Stored entries as persisted, without decoding the payloads.
    pub async fn list_raw(&self) -> Result<Vec<QueueEntry<Value>>, QueueError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueueEntry<Envelope<P>>>, QueueError> {
        Ok(self.store.get(id).await?.map(decode_entry).transpose()?)
    }

    pub async fn count(&self) -> Result<i64, QueueError> {
        Ok(self.store.count().await?)
    }

    pub fn state(&self) -> QueueState {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<QueueState> {
        self.status.subscribe()
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        Ok(QueueSnapshot {
            name: self.name().to_string(),
            state: self.state(),
            pending: self.store.count().await?,
            failing: self.store.count_failing().await?,
            online: self.connectivity.is_online(),
        })
    }

    fn begin_pass(&self) -> Option<PassGuard<'_>> {
        self.flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.status.send_replace(QueueState::Syncing);
        Some(PassGuard {
            flushing: &self.flushing,
            status: &self.status,
        })
    }

    async fn persist(&self, envelope: &Envelope<P>, next_attempt: i64) -> Result<i64, QueueError> {
        let payload = serde_json::to_value(envelope).map_err(StorageError::Encode)?;
        let created_at = self.clock.now_ms();
        let id = self.store.add(&payload, created_at, next_attempt).await?;
        tracing::info!("Queued {} submission {id}", self.name());
        Ok(id)
    }

    async fn attempt(&self, envelope: &Envelope<P>) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.delivery_timeout, self.delivery.deliver(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.delivery_timeout)),
        }
    }

    /// Deliver a stored entry and record the result in the store.
    async fn attempt_entry(&self, entry: QueueEntry<Value>) -> Result<Attempt, QueueError> {
        let id = entry.id;
        let result = match serde_json::from_value::<Envelope<P>>(entry.payload) {
            Ok(envelope) => self.attempt(&envelope).await,
            Err(e) => Err(DeliveryError::Rejected(format!("undecodable payload: {e}"))),
        };

        match result {
            Ok(()) => {
                self.store.remove(id).await?;
                tracing::debug!("Delivered {} submission {id}", self.name());
                Ok(Attempt::Delivered)
            }
            Err(e) => {
                let attempts = entry.attempts.saturating_add(1);
                let next_attempt = self
                    .backoff
                    .next_attempt(self.clock.now_ms(), attempts)
                    .max(entry.next_attempt);
                self.store
                    .update(id, EntryPatch::failed_attempt(attempts, next_attempt))
                    .await?;
                tracing::warn!(
                    "Delivery of {} submission {id} failed (attempt {attempts}): {e}",
                    self.name()
                );
                Ok(Attempt::Failed {
                    attempts,
                    next_attempt,
                })
            }
        }
    }

    fn register_background_sync(&self) {
        let result = match &self.background_sync {
            Some(sync) => sync.register(&self.sync_tag),
            None => Err(RegistrationError::Unsupported),
        };
        if let Err(e) = result {
            tracing::debug!("Background sync registration for {} skipped: {e}", self.sync_tag);
        }
    }
}

fn decode_entry<P: Payload>(
    entry: QueueEntry<Value>,
) -> Result<QueueEntry<Envelope<P>>, StorageError> {
    let id = entry.id;
    let QueueEntry {
        payload,
        created_at,
        attempts,
        next_attempt,
        ..
    } = entry;
    let payload = serde_json::from_value(payload)
        .map_err(|source| StorageError::CorruptPayload { id, source })?;
    Ok(QueueEntry {
        id,
        payload,
        created_at,
        attempts,
        next_attempt,
    })
}
