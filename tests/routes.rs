//! HTTP surface of the router, exercised in-process.

mod common;

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use vaani_gateway::{routes, state::AppState};

fn request(uri: &str) -> Request<Body> {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    request
}

#[tokio::test]
async fn test_health_endpoints() {
    let state = AppState::with_connector(common::test_config(), None).unwrap();
    let app = routes::create_app(state);

    for uri in ["/healthz", "/health"] {
        let response = app.clone().oneshot(request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"OK\n");
    }
}

#[tokio::test]
async fn test_live_route_requires_upgrade() {
    let state = AppState::with_connector(common::test_config(), None).unwrap();
    let app = routes::create_app(state.clone());

    let response = app.oneshot(request("/")).await.unwrap();
    assert_ne!(response.status(), StatusCode::OK);
    assert!(response.status().is_client_error());
    assert_eq!(state.ws_connection_count(), 0);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let state = AppState::with_connector(common::test_config(), None).unwrap();
    let app = routes::create_app(state);

    let response = app.oneshot(request("/v1/realtime")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
