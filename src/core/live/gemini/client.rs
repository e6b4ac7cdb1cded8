//! Gemini Live API websocket client.
//!
//! Implements [`LiveConnector`] on top of the `BidiGenerateContent` websocket
//! service.
//!
//! # Connection flow
//!
//! 1. Open the websocket (`?key=` query authentication).
//! 2. Send `setup` and wait for `setupComplete` within the setup deadline.
//! 3. Split the socket: a writer task owns the sink and serializes every
//!    outgoing frame, the [`GeminiLiveReceiver`] owns the stream.
//!
//! Both relay flows that write (audio input and tool responses) go through
//! the same writer channel, so there is exactly one owner of the sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::GeminiLiveSettings;
use super::messages::{ClientMessage, ServerMessage};
use crate::core::audio::AudioFrame;
use crate::core::live::base::{
    BoxedLiveReceiver, BoxedLiveSender, ConversationConfig, FunctionResponse, LiveConnector,
    LiveError, LiveReceiver, LiveResult, LiveSender, ResponseUnit,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Instruction for the writer task.
enum WriterCommand {
    /// Send a frame and report the outcome.
    Send {
        message: Message,
        ack: Option<oneshot::Sender<Result<(), String>>>,
    },
    /// Send a close frame and stop.
    Close,
}

// =============================================================================
// Connector
// =============================================================================

/// Opens Gemini Live sessions.
#[derive(Debug, Clone)]
pub struct GeminiLiveConnector {
    settings: GeminiLiveSettings,
}

impl GeminiLiveConnector {
    pub fn new(settings: GeminiLiveSettings) -> LiveResult<Self> {
        if settings.api_key.is_empty() {
            return Err(LiveError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &GeminiLiveSettings {
        &self.settings
    }

    /// Send `setup` and read until `setupComplete`.
    ///
    /// Content that arrives before the acknowledgement is kept for the receiver.
    async fn handshake(
        sink: &mut WsSink,
        stream: &mut WsSource,
        config: &ConversationConfig,
    ) -> LiveResult<VecDeque<ResponseUnit>> {
        let setup = serde_json::to_string(&ClientMessage::setup(config))
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        sink.send(Message::Text(setup.into()))
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))?;

        let mut early = VecDeque::new();
        loop {
            let msg = match stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(LiveError::WebSocketError(e.to_string())),
                None => {
                    return Err(LiveError::Closed(
                        "stream ended before setup completed".to_string(),
                    ));
                }
            };

            let body = match msg {
                Message::Text(text) => text.as_bytes().to_vec(),
                Message::Binary(data) => data.to_vec(),
                Message::Close(frame) => {
                    return Err(LiveError::ConnectionFailed(describe_close(frame.as_ref())));
                }
                Message::Ping(data) => {
                    sink.send(Message::Pong(data))
                        .await
                        .map_err(|e| LiveError::WebSocketError(e.to_string()))?;
                    continue;
                }
                _ => continue,
            };

            match ServerMessage::parse(&body) {
                Ok(server_msg) if server_msg.is_setup_complete() => {
                    early.extend(server_msg.into_units());
                    return Ok(early);
                }
                Ok(server_msg) => early.extend(server_msg.into_units()),
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse server message during setup: {} - {}",
                        e,
                        String::from_utf8_lossy(&body)
                    );
                }
            }
        }
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        config: &ConversationConfig,
    ) -> LiveResult<(BoxedLiveSender, BoxedLiveReceiver)> {
        let url = self.settings.ws_url();
        let setup_timeout = self.settings.setup_timeout;

        let (ws_stream, _response) =
            tokio::time::timeout(setup_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| LiveError::Timeout("websocket connect".to_string()))?
                .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        let early = tokio::time::timeout(
            setup_timeout,
            Self::handshake(&mut ws_sink, &mut ws_source, config),
        )
        .await
        .map_err(|_| LiveError::Timeout("setupComplete".to_string()))??;

        tracing::info!(model = %config.model, "Connected to Gemini Live API");

        let (tx, rx) = mpsc::channel::<WriterCommand>(WS_CHANNEL_CAPACITY);
        tokio::spawn(run_writer(ws_sink, rx));

        let sender = GeminiLiveSender {
            tx: tx.clone(),
            write_timeout: self.settings.write_timeout,
            closed: AtomicBool::new(false),
        };
        let receiver = GeminiLiveReceiver {
            stream: ws_source,
            pending: early,
            writer: tx,
            read_timeout: self.settings.read_timeout,
        };

        Ok((Box::new(sender), Box::new(receiver)))
    }
}

/// Sole owner of the websocket sink.
async fn run_writer(mut sink: WsSink, mut rx: mpsc::Receiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Send { message, ack } => {
                let result = sink.send(message).await.map_err(|e| e.to_string());
                let failed = result.is_err();
                if let Err(e) = &result {
                    tracing::error!("Failed to send WebSocket message: {}", e);
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
                if failed {
                    break;
                }
            }
            WriterCommand::Close => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "session closed".into(),
                    })))
                    .await;
                let _ = sink.close().await;
                break;
            }
        }
    }
    tracing::debug!("Gemini Live writer task finished");
}

fn describe_close(frame: Option<&CloseFrame>) -> String {
    match frame {
        Some(frame) => format!("closed by server ({}): {}", frame.code, frame.reason),
        None => "closed by server".to_string(),
    }
}

// =============================================================================
// Sender
// =============================================================================

/// Write half of a Gemini Live session.
pub struct GeminiLiveSender {
    tx: mpsc::Sender<WriterCommand>,
    write_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl GeminiLiveSender {
    async fn send_message(&self, message: &ClientMessage) -> LiveResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LiveError::NotConnected);
        }

        let json = serde_json::to_string(message)
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        let (ack_tx, ack_rx) = oneshot::channel();

        let delivery = async {
            self.tx
                .send(WriterCommand::Send {
                    message: Message::Text(json.into()),
                    ack: Some(ack_tx),
                })
                .await
                .map_err(|_| LiveError::NotConnected)?;
            match ack_rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(LiveError::WebSocketError(e)),
                Err(_) => Err(LiveError::NotConnected),
            }
        };

        match self.write_timeout {
            Some(deadline) => tokio::time::timeout(deadline, delivery)
                .await
                .map_err(|_| LiveError::Timeout(format!("remote write exceeded {deadline:?}")))?,
            None => delivery.await,
        }
    }
}

#[async_trait]
impl LiveSender for GeminiLiveSender {
    async fn send_realtime_input(&self, frame: &AudioFrame) -> LiveResult<()> {
        self.send_message(&ClientMessage::realtime_audio(frame)).await
    }

    async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> LiveResult<()> {
        tracing::debug!(count = responses.len(), "Sending tool response batch");
        self.send_message(&ClientMessage::tool_response(responses))
            .await
    }

    async fn send_client_text(&self, text: &str) -> LiveResult<()> {
        self.send_message(&ClientMessage::user_text(text)).await
    }

    async fn close(&self) -> LiveResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // The writer may already be gone after a failed send.
        let _ = self.tx.send(WriterCommand::Close).await;
        tracing::debug!("Gemini Live session closed");
        Ok(())
    }
}

// =============================================================================
// Receiver
// =============================================================================

/// Read half of a Gemini Live session.
pub struct GeminiLiveReceiver {
    stream: WsSource,
    pending: VecDeque<ResponseUnit>,
    writer: mpsc::Sender<WriterCommand>,
    read_timeout: Option<Duration>,
}

impl GeminiLiveReceiver {
    async fn read_frame(&mut self) -> LiveResult<Option<Message>> {
        let next = match self.read_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.stream.next())
                .await
                .map_err(|_| LiveError::Timeout(format!("remote read exceeded {deadline:?}")))?,
            None => self.stream.next().await,
        };
        match next {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(LiveError::WebSocketError(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LiveReceiver for GeminiLiveReceiver {
    async fn next_unit(&mut self) -> LiveResult<Option<ResponseUnit>> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                return Ok(Some(unit));
            }

            let Some(msg) = self.read_frame().await? else {
                tracing::info!("Gemini Live stream ended");
                return Ok(None);
            };

            let body = match msg {
                Message::Text(text) => text.as_bytes().to_vec(),
                Message::Binary(data) => data.to_vec(),
                Message::Close(frame) => {
                    return match frame {
                        Some(frame) if frame.code != CloseCode::Normal => {
                            Err(LiveError::Closed(describe_close(Some(&frame))))
                        }
                        _ => {
                            tracing::info!("WebSocket closed by server");
                            Ok(None)
                        }
                    };
                }
                Message::Ping(data) => {
                    let pong = WriterCommand::Send {
                        message: Message::Pong(data),
                        ack: None,
                    };
                    if self.writer.try_send(pong).is_err() {
                        tracing::debug!("Dropping pong, writer busy or gone");
                    }
                    continue;
                }
                _ => continue,
            };

            match ServerMessage::parse(&body) {
                Ok(server_msg) => self.pending.extend(server_msg.into_units()),
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse server message: {} - {}",
                        e,
                        String::from_utf8_lossy(&body)
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_requires_api_key() {
        let result = GeminiLiveConnector::new(GeminiLiveSettings::default());
        assert!(matches!(result, Err(LiveError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_connector_keeps_settings() {
        let connector = GeminiLiveConnector::new(GeminiLiveSettings {
            api_key: "k".to_string().into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(connector.settings().api_version, "v1alpha");
    }

    #[test]
    fn test_describe_close() {
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: "quota".into(),
        };
        let text = describe_close(Some(&frame));
        assert!(text.contains("quota"));
        assert_eq!(describe_close(None), "closed by server");
    }
}
