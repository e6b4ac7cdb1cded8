pub mod api;
pub mod live;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Public health routes plus the connection-limited live websocket route.
///
/// Cross-cutting layers (CORS, rate limiting, security headers) are added by
/// the binary on top of this router.
pub fn create_app(state: Arc<AppState>) -> Router {
    let live_routes = live::create_live_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    api::create_api_router()
        .merge(live_routes)
        .with_state(state)
}
