use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::queue::{FlushOutcome, QueueSnapshot, RetryOutcome, SubmitOutcome};
use crate::registry::QueueHandle;
use crate::state::SharedState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub auth_token: Option<String>,
    pub payload: Value,
}

fn find_queue(state: &SharedState, name: &str) -> Result<Arc<dyn QueueHandle>, AppError> {
    state
        .queues
        .get(name)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Queue {name} not found")))
}

pub async fn list(State(state): State<SharedState>) -> Result<Json<Vec<QueueSnapshot>>, AppError> {
    let mut snapshots = Vec::with_capacity(state.queues.len());
    for queue in state.queues.list() {
        snapshots.push(queue.snapshot().await?);
    }
    Ok(Json(snapshots))
}

pub async fn get(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    let queue = find_queue(&state, &name)?;
    let snapshot = queue.snapshot().await?;
    let entries = queue.entries().await?;

    Ok(Json(json!({
        "queue": snapshot,
        "entries": entries,
    })))
}

pub async fn submit(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Response, AppError> {
    let queue = find_queue(&state, &name)?;
    let outcome = queue.submit_json(req.auth_token, req.payload).await?;

    let status = match outcome {
        SubmitOutcome::Delivered => StatusCode::OK,
        SubmitOutcome::Queued { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)).into_response())
}

/// "Retry All": a flush pass that still honours backoff timers.
pub async fn flush(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<FlushOutcome>, AppError> {
    let queue = find_queue(&state, &name)?;
    Ok(Json(queue.flush().await?))
}

pub async fn retry(
    State(state): State<SharedState>,
    Path((name, id)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    let queue = find_queue(&state, &name)?;
    let outcome = queue.retry(id).await?;

    let status = match outcome {
        RetryOutcome::NotFound => StatusCode::NOT_FOUND,
        RetryOutcome::AlreadyRunning => StatusCode::CONFLICT,
        RetryOutcome::Delivered | RetryOutcome::Rescheduled { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

pub async fn remove(
    State(state): State<SharedState>,
    Path((name, id)): Path<(String, i64)>,
) -> Result<Json<Value>, AppError> {
    let queue = find_queue(&state, &name)?;
    queue.remove(id).await?;
    Ok(Json(json!({ "status": "removed" })))
}
