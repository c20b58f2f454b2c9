//! CRM activity log ("touches": calls, visits, emails).
//!
//! Touches are delivered in order: a follow-up may refer to a stage change
//! logged just before it, so the queue stops at the first failure.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{AppQueueSettings, Attachment, QueueDeps};
use crate::delivery::HttpDelivery;
use crate::queue::SubmissionQueue;

pub const SETTINGS: AppQueueSettings = AppQueueSettings {
    store_name: "crm",
    sync_tag: "crm-sync",
    ordered: true,
    action: Some("interaction"),
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmTouch {
    pub company_id: String,
    #[serde(default)]
    pub contact_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub next_follow_up: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default = "default_sentiment")]
    pub sentiment: u8,
    /// Minutes.
    #[serde(default)]
    pub duration: u32,
    pub timestamp: String,
    #[serde(default)]
    pub files: Vec<Attachment>,
}

fn default_sentiment() -> u8 {
    3
}

impl CrmTouch {
    /// Comma-separated tag input, trimmed, empties dropped.
    pub fn parse_tags(input: &str) -> Vec<String> {
        input
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub type CrmQueue = SubmissionQueue<CrmTouch, HttpDelivery>;

/// `delivery` gets the `"interaction"` action merged into its bodies.
pub fn queue(pool: SqlitePool, delivery: HttpDelivery, deps: QueueDeps) -> CrmQueue {
    let delivery = match SETTINGS.action {
        Some(action) => delivery.with_action(action),
        None => delivery,
    };
    SETTINGS.build(pool, delivery, deps)
}
