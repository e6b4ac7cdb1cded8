//! Connection limit middleware for the live websocket route
//!
//! Enforces the global websocket limit and the per-IP limit before the
//! upgrade handshake runs. The acquired slot travels to the handler as a
//! [`ConnectionSlot`] extension and is released when the slot is dropped.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use vaani_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/", get(live_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// A reserved websocket slot, released once every clone is dropped.
#[derive(Clone)]
pub struct ConnectionSlot(Arc<SlotGuard>);

impl ConnectionSlot {
    pub fn ip(&self) -> IpAddr {
        self.0.ip
    }
}

impl std::fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionSlot").field(&self.0.ip).finish()
    }
}

struct SlotGuard {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
        tracing::debug!(ip = %self.ip, "Released websocket connection slot");
    }
}

/// Middleware that enforces connection limits for websocket upgrades.
///
/// Returns 503 when the global limit is reached and 429 when the per-IP
/// limit is reached. Requests without an `Upgrade: websocket` header pass
/// through untouched.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            let slot = ConnectionSlot(Arc::new(SlotGuard {
                state: state.clone(),
                ip: client_ip,
            }));
            request.extensions_mut().insert(slot);
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting connection: global limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting connection: per-IP limit reached");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, middleware, routing::get};
    use std::net::Ipv4Addr;
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::core::live::ResponseModality;

    fn limited_config(max_per_ip: u32) -> ServerConfig {
        ServerConfig {
            host: "localhost".to_string(),
            port: 3001,
            tls: None,
            google_api_key: None,
            live_model: "gemini-2.0-flash-live-001".to_string(),
            live_api_version: "v1alpha".to_string(),
            live_endpoint: None,
            live_voice: "Puck".to_string(),
            live_response_modality: ResponseModality::Audio,
            live_turn_coverage: None,
            live_context_window_compression: None,
            live_setup_timeout_seconds: 15,
            assistant_name: "yoda_diagnostics".to_string(),
            assistant_tools: None,
            diagnostics_api_url: "http://localhost:9999".to_string(),
            upstream_queue_capacity: 5,
            flush_on_turn_complete: true,
            remote_read_timeout_seconds: None,
            remote_write_timeout_seconds: Some(10),
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: max_per_ip,
        }
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                connection_limit_middleware,
            ))
            .with_state(state)
    }

    fn request(upgrade: bool) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if upgrade {
            builder = builder.header("upgrade", "websocket");
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((Ipv4Addr::LOCALHOST, 40000))));
        request
    }

    #[tokio::test]
    async fn test_plain_requests_bypass_limits() {
        let state = AppState::with_connector(limited_config(0), None).unwrap();
        let response = app(state.clone()).oneshot(request(false)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.ws_connection_count(), 0);
    }

    #[tokio::test]
    async fn test_upgrade_rejected_over_per_ip_limit() {
        let state = AppState::with_connector(limited_config(0), None).unwrap();
        let response = app(state.clone()).oneshot(request(true)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(state.ws_connection_count(), 0);
    }

    #[tokio::test]
    async fn test_slot_released_when_request_completes() {
        let state = AppState::with_connector(limited_config(1), None).unwrap();

        // The handler is not a websocket handler, so the slot is dropped with the request.
        let response = app(state.clone()).oneshot(request(true)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&Ipv4Addr::LOCALHOST.into()), 0);
    }
}
