//! Live websocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::live::live_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the live websocket router
///
/// # Endpoint
///
/// `GET /` - WebSocket upgrade for a relayed Live API session
///
/// # Protocol
///
/// Clients stream `realtime_input` messages carrying base64 PCM chunks.
/// The server answers with `audio`, `assistant_activity` and `model_error`
/// messages; see [`crate::handlers::live`].
///
/// Connection limits are layered on in [`crate::routes::create_app`].
pub fn create_live_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(live_handler))
        .layer(TraceLayer::new_for_http())
}
