pub mod apps;
pub mod background_sync;
pub mod backoff;
pub mod capture;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod delivery;
pub mod error;
pub mod models;
pub mod queue;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::apps::{QueueDeps, crm, estimating, field_reports};
use crate::background_sync::BackgroundSync;
use crate::config::Config;
use crate::connectivity::Connectivity;
use crate::delivery::HttpDelivery;
use crate::error::DeliveryError;
use crate::registry::QueueRegistry;
use crate::state::SharedState;

/// Build one queue per application whose endpoint is configured.
pub fn build_queues(
    pool: &SqlitePool,
    config: &Config,
    connectivity: Connectivity,
    background_sync: Option<Arc<dyn BackgroundSync>>,
) -> Result<QueueRegistry, DeliveryError> {
    let deps = QueueDeps {
        backoff: config.backoff,
        delivery_timeout: config.delivery_timeout,
        background_sync,
        ..QueueDeps::new(connectivity)
    };

    let mut queues = QueueRegistry::new();

    match &config.field_reports_url {
        Some(url) => {
            let delivery = HttpDelivery::new(url, config.delivery_timeout)?;
            queues.register(Arc::new(field_reports::queue(
                pool.clone(),
                delivery,
                deps.clone(),
            )));
        }
        None => tracing::warn!("FIELDQUEUE_FIELD_REPORTS_URL not set, field reports disabled"),
    }

    match &config.estimating_url {
        Some(url) => {
            let delivery = HttpDelivery::new(url, config.delivery_timeout)?;
            queues.register(Arc::new(estimating::queue(
                pool.clone(),
                delivery,
                deps.clone(),
            )));
        }
        None => tracing::warn!("FIELDQUEUE_ESTIMATING_URL not set, estimating disabled"),
    }

    match &config.crm_url {
        Some(url) => {
            let delivery = HttpDelivery::new(url, config.delivery_timeout)?;
            queues.register(Arc::new(crm::queue(pool.clone(), delivery, deps)));
        }
        None => tracing::warn!("FIELDQUEUE_CRM_URL not set, CRM disabled"),
    }

    Ok(queues)
}

pub fn build_app(state: SharedState) -> Router {
    // Security headers
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(middleware)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
