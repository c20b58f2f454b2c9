//! Estimating journal: site measurements and bid data captured on walkthroughs.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{AppQueueSettings, Attachment, Location, QueueDeps, new_submission_id};
use crate::delivery::HttpDelivery;
use crate::queue::SubmissionQueue;

pub const SETTINGS: AppQueueSettings = AppQueueSettings {
    store_name: "estimating",
    sync_tag: "estimating-sync",
    ordered: false,
    action: None,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub label: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateEntry {
    #[serde(default = "new_submission_id")]
    pub entry_id: String,
    pub project: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub rfp: String,
    #[serde(default)]
    pub bid_due: String,
    #[serde(default)]
    pub bid_amount: f64,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    pub timestamp: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub files: Vec<Attachment>,
    #[serde(default)]
    pub staged_file_ids: Vec<String>,
}

pub type EstimateQueue = SubmissionQueue<EstimateEntry, HttpDelivery>;

pub fn queue(pool: SqlitePool, delivery: HttpDelivery, deps: QueueDeps) -> EstimateQueue {
    SETTINGS.build(pool, delivery, deps)
}
