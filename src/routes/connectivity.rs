use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::connectivity::ConnectivityState;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct UpdateConnectivity {
    pub online: bool,
}

pub async fn get(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "online": state.connectivity.is_online() }))
}

/// The UI host reports its `online`/`offline` events here. Going online wakes
/// the sync worker.
pub async fn update(
    State(state): State<SharedState>,
    Json(req): Json<UpdateConnectivity>,
) -> Json<Value> {
    let changed = state
        .connectivity
        .set(ConnectivityState::from_online(req.online));
    Json(json!({ "online": req.online, "changed": changed }))
}
