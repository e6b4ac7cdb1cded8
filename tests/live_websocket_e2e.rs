//! Websocket client -> gateway -> mock Live API, over real sockets.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use base64::prelude::*;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

use vaani_gateway::{ServerConfig, routes, state::AppState};

const WAIT: Duration = Duration::from_secs(10);

type MockStream = futures::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
>;

async fn next_json(rx: &mut MockStream) -> Value {
    loop {
        match rx.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(Message::Binary(data))) => return serde_json::from_slice(&data).unwrap(),
            Some(Ok(Message::Close(_))) | None => panic!("gateway closed the Live stream early"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("mock Live API read failed: {e}"),
        }
    }
}

/// One-session Live API: acknowledge setup, answer the first audio chunk with
/// audio and a booking tool call, then close once the tool result arrives.
async fn mock_live_api(listener: TcpListener, seen: mpsc::UnboundedSender<Value>) {
    let (tcp, _) = listener.accept().await.unwrap();
    let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let (mut tx, mut rx) = ws.split();

    seen.send(next_json(&mut rx).await).unwrap();
    tx.send(Message::Text(json!({"setupComplete": {}}).to_string().into()))
        .await
        .unwrap();

    seen.send(next_json(&mut rx).await).unwrap();
    let audio = json!({
        "serverContent": {"modelTurn": {"parts": [
            {"inlineData": {
                "mimeType": "audio/pcm;rate=24000",
                "data": BASE64_STANDARD.encode([7u8; 480]),
            }}
        ]}}
    });
    tx.send(Message::Text(audio.to_string().into())).await.unwrap();

    let call = json!({
        "toolCall": {"functionCalls": [{
            "id": "call-1",
            "name": "book_appointment",
            "args": {"name": "Asha", "phone": 9876543210u64, "testName": "CBC"}
        }]}
    });
    tx.send(Message::Text(call.to_string().into())).await.unwrap();

    seen.send(next_json(&mut rx).await).unwrap();
    let _ = tx.send(Message::Close(None)).await;
    while let Some(Ok(_)) = rx.next().await {}
}

async fn serve(config: ServerConfig) -> SocketAddr {
    let state = AppState::new(config).await.unwrap();
    let app = routes::create_app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// Read client-bound JSON messages until the gateway closes the socket.
async fn collect_until_close(
    client: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Vec<Value> {
    let mut received = Vec::new();
    while let Some(msg) = client.next().await {
        match msg {
            Ok(Message::Text(text)) => received.push(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    received
}

#[tokio::test]
async fn test_websocket_session_relays_audio_and_tools() {
    let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live_addr = live.local_addr().unwrap();
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    tokio::spawn(mock_live_api(live, seen_tx));

    let mut config = common::test_config();
    config.live_endpoint = Some(format!("ws://{live_addr}"));
    let addr = serve(config).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap();

    let chunk = json!({
        "realtime_input": {"media_chunks": [
            {"mime_type": "audio/pcm", "data": BASE64_STANDARD.encode([1u8, 2, 3, 4])}
        ]}
    });
    client
        .send(Message::Text(chunk.to_string().into()))
        .await
        .unwrap();

    let received = tokio::time::timeout(WAIT, collect_until_close(&mut client))
        .await
        .expect("gateway never closed the client socket");

    // What the Live API saw, in order: setup, audio, tool response.
    let setup = seen.recv().await.unwrap();
    assert_eq!(setup["setup"]["model"], "models/gemini-2.0-flash-live-001");
    let declarations = setup["setup"]["tools"][0]["functionDeclarations"]
        .as_array()
        .unwrap();
    assert_eq!(declarations.len(), 3);

    let input = seen.recv().await.unwrap();
    assert_eq!(
        input["realtimeInput"]["audio"]["data"],
        BASE64_STANDARD.encode([1u8, 2, 3, 4])
    );

    let tool = seen.recv().await.unwrap();
    let response = &tool["toolResponse"]["functionResponses"][0];
    assert_eq!(response["id"], "call-1");
    assert_eq!(response["name"], "book_appointment");
    assert_eq!(response["response"]["result"], "Booking successful");

    // What the client saw.
    assert!(received.contains(&json!({"audio": BASE64_STANDARD.encode([7u8; 480])})));
    assert!(received.contains(&json!({
        "assistant_activity": "TOOL called - book_appointment"
    })));
    assert!(
        received
            .iter()
            .all(|msg| msg.get("model_error").is_none()),
        "unexpected error in {received:?}"
    );
}

#[tokio::test]
async fn test_missing_api_key_reports_model_error() {
    let mut config = common::test_config();
    config.google_api_key = None;
    let addr = serve(config).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap();

    let received = tokio::time::timeout(WAIT, collect_until_close(&mut client))
        .await
        .unwrap();
    assert_eq!(
        received,
        vec![json!({"model_error": "Live API key is not configured"})]
    );
}

#[tokio::test]
async fn test_unreachable_live_api_reports_model_error() {
    // Bind then drop to get a port nobody listens on.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let mut config = common::test_config();
    config.live_endpoint = Some(format!("ws://{dead_addr}"));
    let addr = serve(config).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap();

    let received = tokio::time::timeout(WAIT, collect_until_close(&mut client))
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0]["model_error"].as_str().unwrap().contains("Live API error"));
}

#[tokio::test]
async fn test_global_connection_limit_rejects_upgrade() {
    let mut config = common::test_config();
    config.max_websocket_connections = Some(0);
    let addr = serve(config).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 503),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

/// Acknowledge setup, then never send anything. Keeps draining what the
/// gateway writes until `read_input` is false, after which it stops reading.
async fn silent_live_api(listener: TcpListener, read_input: bool) {
    let (tcp, _) = listener.accept().await.unwrap();
    let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let (mut tx, mut rx) = ws.split();

    next_json(&mut rx).await;
    tx.send(Message::Text(json!({"setupComplete": {}}).to_string().into()))
        .await
        .unwrap();

    if read_input {
        while let Some(Ok(_)) = rx.next().await {}
    } else {
        // Hold the socket open without reading so the gateway's writes stall.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop((tx, rx));
    }
}

#[tokio::test]
async fn test_silent_live_api_hits_read_deadline() {
    let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live_addr = live.local_addr().unwrap();
    tokio::spawn(silent_live_api(live, true));

    let mut config = common::test_config();
    config.live_endpoint = Some(format!("ws://{live_addr}"));
    config.remote_read_timeout_seconds = Some(1);
    let addr = serve(config).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let received = tokio::time::timeout(WAIT, collect_until_close(&mut client))
        .await
        .expect("gateway never closed the client socket");

    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(received.len(), 1, "unexpected messages: {received:?}");
    let error = received[0]["model_error"].as_str().unwrap();
    assert!(error.contains("remote read exceeded"), "{error}");
}

#[tokio::test]
async fn test_stalled_live_api_hits_write_deadline() {
    let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live_addr = live.local_addr().unwrap();
    tokio::spawn(silent_live_api(live, false));

    let mut config = common::test_config();
    config.live_endpoint = Some(format!("ws://{live_addr}"));
    config.remote_write_timeout_seconds = Some(1);
    let addr = serve(config).await;

    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap();
    let (mut client_tx, mut client_rx) = client.split();

    // Keep pushing large chunks until the socket buffers to the Live API fill.
    let chunk = json!({
        "realtime_input": {"media_chunks": [
            {"mime_type": "audio/pcm", "data": BASE64_STANDARD.encode(vec![3u8; 512 * 1024])}
        ]}
    })
    .to_string();
    let pusher = tokio::spawn(async move {
        for _ in 0..256 {
            if client_tx
                .send(Message::Text(chunk.clone().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let received = tokio::time::timeout(WAIT, async {
        let mut received = Vec::new();
        while let Some(Ok(msg)) = client_rx.next().await {
            match msg {
                Message::Text(text) => {
                    received.push(serde_json::from_str::<Value>(text.as_str()).unwrap())
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    })
    .await
    .expect("gateway never closed the client socket");
    pusher.abort();

    assert_eq!(received.len(), 1, "unexpected messages: {received:?}");
    let error = received[0]["model_error"].as_str().unwrap();
    assert!(error.contains("remote write exceeded"), "{error}");
}
