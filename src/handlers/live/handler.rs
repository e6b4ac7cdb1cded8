//! Live websocket handler
//!
//! One websocket connection is one [`RelaySession`]. The socket is split:
//! the read half becomes the session's [`InboundSource`], and the write half
//! is owned by a single writer task fed through a channel, which the
//! session's [`OutboundSink`] pushes into.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::audio::AudioFrame;
use crate::core::relay::{
    ClientNotice, InboundSource, OutboundSink, RelayError, RelayResult, RelaySession,
};
use crate::middleware::ConnectionSlot;
use crate::state::AppState;

use super::messages::{ClientEnvelope, LiveMessageRoute, ServerEnvelope};

/// Buffer between the session and the websocket writer
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Live websocket handler
///
/// Upgrades the connection and relays it to the Live API for the configured
/// assistant. The connection slot reserved by the limit middleware is held
/// until the session ends.
pub async fn live_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let slot = slot.map(|Extension(slot)| slot);
    info!(ip = ?slot.as_ref().map(ConnectionSlot::ip), "Live websocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            handle_live_socket(socket, state).await;
            drop(slot);
        })
}

/// Run one relay session over an upgraded socket.
pub async fn handle_live_socket(socket: WebSocket, state: Arc<AppState>) {
    let (ws_sender, ws_receiver) = socket.split();
    let (route_tx, route_rx) = mpsc::channel::<LiveMessageRoute>(CHANNEL_BUFFER_SIZE);
    let writer = tokio::spawn(run_writer(ws_sender, route_rx));

    let sink: Arc<dyn OutboundSink> = Arc::new(WebSocketSink::new(route_tx));

    match state.connector() {
        Some(connector) => {
            let session = RelaySession::new(
                connector,
                state.registry.clone(),
                state.conversation.clone(),
                state.relay_settings.clone(),
            );
            let session_id = session.id();
            state.register_session(session_id, session.cancellation_token());
            info!(%session_id, "Live websocket connection established");

            let source: Box<dyn InboundSource> = Box::new(WebSocketSource::new(ws_receiver));
            if let Err(e) = session.run(Some(source), sink).await {
                warn!(%session_id, "Live session ended with error: {}", e);
            }
            state.unregister_session(&session_id);
        }
        None => {
            warn!("Refusing live session: no Live API key configured");
            let notice = ClientNotice::ModelError("Live API key is not configured".to_string());
            if let Err(e) = sink.notify(notice).await {
                debug!("Could not deliver error notice: {}", e);
            }
            if let Err(e) = sink.close().await {
                debug!("Failed to close websocket: {}", e);
            }
            drop(sink);
        }
    }

    // The writer exits after the close frame, or once every route sender is gone.
    if let Err(e) = writer.await {
        error!("Websocket writer task failed: {}", e);
    }
    info!("Live websocket connection terminated");
}

async fn run_writer(
    mut sender: SplitSink<WebSocket, Message>,
    mut routes: mpsc::Receiver<LiveMessageRoute>,
) {
    while let Some(route) = routes.recv().await {
        let result = match route {
            LiveMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                Ok(json) => sender.send(Message::Text(json.into())).await,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            },
            LiveMessageRoute::Close => {
                debug!("Closing live websocket connection");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };

        if let Err(e) = result {
            warn!("Failed to send websocket message: {}", e);
            break;
        }
    }
}

// =============================================================================
// Transport adapters
// =============================================================================

/// Inbound audio from the client's websocket.
///
/// One client message may carry several chunks; they are handed out one
/// frame at a time. Malformed messages are logged and skipped.
pub struct WebSocketSource<S> {
    stream: S,
    pending: VecDeque<AudioFrame>,
}

impl<S> WebSocketSource<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl<S> InboundSource for WebSocketSource<S>
where
    S: Stream<Item = Result<Message, axum::Error>> + Send + Unpin,
{
    async fn next_frame(&mut self) -> RelayResult<Option<AudioFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            let decoded = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => ClientEnvelope::decode(text.as_str().as_bytes()),
                Some(Ok(Message::Binary(data))) => ClientEnvelope::decode(&data),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Client closed websocket");
                    return Ok(None);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(e)) => return Err(RelayError::ClientTransport(e.to_string())),
                None => return Ok(None),
            };

            match decoded {
                Ok(envelope) => self.pending.extend(envelope.into_frames()),
                Err(e) => warn!("Dropping malformed client message: {}", e),
            }
        }
    }
}

/// Outbound side of the client's websocket.
///
/// Sends return as soon as the writer has accepted the message, long before
/// the client has played the audio, so delivery is paced by the dispatcher.
pub struct WebSocketSink {
    routes: mpsc::Sender<LiveMessageRoute>,
}

impl WebSocketSink {
    pub fn new(routes: mpsc::Sender<LiveMessageRoute>) -> Self {
        Self { routes }
    }

    async fn send(&self, envelope: ServerEnvelope) -> RelayResult<()> {
        self.routes
            .send(LiveMessageRoute::Outgoing(envelope))
            .await
            .map_err(|_| RelayError::ClientTransport("websocket writer closed".to_string()))
    }
}

#[async_trait]
impl OutboundSink for WebSocketSink {
    async fn deliver(&self, frame: &AudioFrame) -> RelayResult<()> {
        self.send(ServerEnvelope::audio(frame)).await
    }

    fn paced(&self) -> bool {
        true
    }

    async fn notify(&self, notice: ClientNotice) -> RelayResult<()> {
        self.send(notice.into()).await
    }

    async fn close(&self) -> RelayResult<()> {
        // The writer may already be gone if the client disconnected first.
        let _ = self.routes.send(LiveMessageRoute::Close).await;
        Ok(())
    }
}
