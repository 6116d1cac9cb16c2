//! HTTP server module

mod agent_protocol;
mod agents;
mod api;
mod scripts;
mod tasks;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use k6hub_core::PageRequest;
use k6hub_core::page::DEFAULT_PAGE_SIZE;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;
use crate::middleware::require_operator;

pub use agents::{BatchRequest, RemovedAgent};
pub use api::HealthResponse;

/// Prefix every route is mounted under
pub const API_PREFIX: &str = "/api/v1";

fn page_request(page: Option<u32>, limit: Option<u32>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_SIZE))
}

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let agent_protocol = Router::new()
        .route("/health", get(api::health))
        .route("/agents/register", post(agent_protocol::register))
        .route("/agents/heartbeat", post(agent_protocol::heartbeat))
        .route("/agents/jobs/poll", get(agent_protocol::poll))
        .route(
            "/agents/jobs/:job_id/status",
            post(agent_protocol::report_status),
        );

    let admin = Router::new()
        .route("/agents", post(agents::create).get(agents::list))
        .route("/agents/statistics", get(agents::statistics))
        .route("/agents/batch/enable", post(agents::batch_enable))
        .route("/agents/batch/disable", post(agents::batch_disable))
        .route(
            "/agents/:id",
            get(agents::get).put(agents::update).delete(agents::remove),
        )
        .route("/agents/:id/tasks", get(agents::tasks))
        .route("/agents/:id/start", post(agents::start))
        .route("/agents/:id/enable", post(agents::start))
        .route("/agents/:id/stop", post(agents::stop))
        .route("/agents/:id/disable", post(agents::stop))
        .route("/scripts", post(scripts::create).get(scripts::list))
        .route("/scripts/:id", get(scripts::get))
        .route("/tasks", post(tasks::create).get(tasks::list))
        .route("/tasks/statistics", get(tasks::statistics))
        .route(
            "/tasks/:id",
            get(tasks::get).put(tasks::update).delete(tasks::remove),
        )
        .route("/tasks/:id/stop", post(tasks::stop))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_operator,
        ));

    Router::new()
        .nest(API_PREFIX, agent_protocol.merge(admin))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
