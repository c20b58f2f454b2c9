//! Daily field reports from job sites.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{AppQueueSettings, Attachment, Location, QueueDeps, new_submission_id};
use crate::delivery::HttpDelivery;
use crate::queue::SubmissionQueue;

pub const SETTINGS: AppQueueSettings = AppQueueSettings {
    store_name: "field-reports",
    sync_tag: "field-reports-sync",
    ordered: false,
    action: None,
};

/// The task a report logs progress against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Linkage to an ERP job picked from the synced job list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcumaticaJob {
    pub acumatica_project_id: String,
    #[serde(default)]
    pub acumatica_project_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReport {
    #[serde(default = "new_submission_id")]
    pub report_id: String,
    pub project: String,
    pub timestamp: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub manpower: u32,
    #[serde(default)]
    pub safety_flags: bool,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub task: Option<TaskMeta>,
    #[serde(default)]
    pub qty_completed: f64,
    #[serde(default)]
    pub pct_today: f64,
    #[serde(default)]
    pub files: Vec<Attachment>,
    #[serde(default)]
    pub staged_file_ids: Vec<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub acumatica: Option<AcumaticaJob>,
}

pub type FieldReportQueue = SubmissionQueue<FieldReport, HttpDelivery>;

pub fn queue(pool: SqlitePool, delivery: HttpDelivery, deps: QueueDeps) -> FieldReportQueue {
    SETTINGS.build(pool, delivery, deps)
}
