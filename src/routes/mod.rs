pub mod connectivity;
pub mod queues;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Queues
        .route("/api/v1/queues", get(queues::list))
        .route("/api/v1/queues/{name}", get(queues::get))
        .route("/api/v1/queues/{name}/submissions", post(queues::submit))
        .route("/api/v1/queues/{name}/flush", post(queues::flush))
        .route(
            "/api/v1/queues/{name}/entries/{id}/retry",
            post(queues::retry),
        )
        .route(
            "/api/v1/queues/{name}/entries/{id}",
            delete(queues::remove),
        )
        // Connectivity
        .route(
            "/api/v1/connectivity",
            get(connectivity::get).put(connectivity::update),
        )
}
