use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw `queue_entries` row. The payload is JSON text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueEntryRow {
    pub id: i64,
    pub queue: String,
    pub payload: String,
    pub created_at: i64,
    pub attempts: i64,
    pub next_attempt: i64,
}

/// A pending submission. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry<P> {
    pub id: i64,
    pub payload: P,
    pub created_at: i64,
    pub attempts: u32,
    pub next_attempt: i64,
}

impl<P> QueueEntry<P> {
    /// Whether a flush pass running at `now` may attempt this entry.
    pub fn is_eligible(&self, now: i64) -> bool {
        self.next_attempt <= now
    }
}

/// A payload that is not valid JSON comes through as the raw text in a
/// `Value::String`, so one bad row never hides the rest of the queue.
impl From<QueueEntryRow> for QueueEntry<Value> {
    fn from(row: QueueEntryRow) -> Self {
        let payload = match serde_json::from_str(&row.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Queue entry {} has an unreadable payload: {e}", row.id);
                Value::String(row.payload)
            }
        };

        QueueEntry {
            id: row.id,
            payload,
            created_at: row.created_at,
            attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
            next_attempt: row.next_attempt,
        }
    }
}

/// Fields merged into an existing entry by `QueueStore::update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub attempts: Option<u32>,
    pub next_attempt: Option<i64>,
}

impl EntryPatch {
    pub fn failed_attempt(attempts: u32, next_attempt: i64) -> Self {
        Self {
            attempts: Some(attempts),
            next_attempt: Some(next_attempt),
        }
    }
}
