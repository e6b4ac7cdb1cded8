use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api::health_check;
use crate::state::AppState;
use std::sync::Arc;

/// Create the public health-check router
///
/// `GET /healthz` and `GET /health` answer `OK` without authentication or
/// connection limits, so probes never wait on session logic.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}
