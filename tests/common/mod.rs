//! Shared fakes for relay integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;

use vaani_gateway::ServerConfig;
use vaani_gateway::core::audio::AudioFrame;
use vaani_gateway::core::live::{
    BoxedLiveReceiver, BoxedLiveSender, ConversationConfig, FunctionResponse, LiveConnector,
    LiveError, LiveReceiver, LiveResult, LiveSender, ResponseModality, ResponseUnit,
};
use vaani_gateway::core::relay::{ClientNotice, InboundSource, OutboundSink, RelayResult};

// =============================================================================
// Live API fake
// =============================================================================

/// What the relay sent upstream.
#[derive(Debug, Clone)]
pub enum Sent {
    Audio(AudioFrame),
    Tools(Vec<FunctionResponse>),
    Text(String),
}

#[derive(Default)]
pub struct MockRemote {
    pub sent: Mutex<Vec<Sent>>,
    pub closed: AtomicBool,
    pub connects: AtomicUsize,
}

impl MockRemote {
    pub fn sent_audio(&self) -> Vec<AudioFrame> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Audio(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_batches(&self) -> Vec<Vec<FunctionResponse>> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Tools(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Connector handing out one scripted session.
pub struct MockConnector {
    pub remote: Arc<MockRemote>,
    units: Mutex<Option<mpsc::UnboundedReceiver<LiveResult<ResponseUnit>>>>,
    /// Each realtime send takes one permit when set
    gate: Option<Arc<Semaphore>>,
    fail_connect: bool,
}

/// Test handle feeding the fake remote stream. Dropping it closes the stream.
pub struct Script(pub mpsc::UnboundedSender<LiveResult<ResponseUnit>>);

impl Script {
    pub fn unit(&self, unit: ResponseUnit) {
        let _ = self.0.send(Ok(unit));
    }

    pub fn fail(&self, error: LiveError) {
        let _ = self.0.send(Err(error));
    }
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, Script) {
        Self::build(None, false)
    }

    pub fn gated(gate: Arc<Semaphore>) -> (Arc<Self>, Script) {
        Self::build(Some(gate), false)
    }

    pub fn failing() -> (Arc<Self>, Script) {
        Self::build(None, true)
    }

    fn build(gate: Option<Arc<Semaphore>>, fail_connect: bool) -> (Arc<Self>, Script) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            remote: Arc::new(MockRemote::default()),
            units: Mutex::new(Some(rx)),
            gate,
            fail_connect,
        });
        (connector, Script(tx))
    }
}

#[async_trait]
impl LiveConnector for MockConnector {
    async fn connect(
        &self,
        _config: &ConversationConfig,
    ) -> LiveResult<(BoxedLiveSender, BoxedLiveReceiver)> {
        self.remote.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(LiveError::ConnectionFailed("refused".to_string()));
        }
        let units = self
            .units
            .lock()
            .take()
            .ok_or(LiveError::ConnectionFailed("already connected".to_string()))?;
        Ok((
            Box::new(MockSender {
                remote: self.remote.clone(),
                gate: self.gate.clone(),
            }),
            Box::new(MockReceiver { units }),
        ))
    }
}

struct MockSender {
    remote: Arc<MockRemote>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl LiveSender for MockSender {
    async fn send_realtime_input(&self, frame: &AudioFrame) -> LiveResult<()> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| LiveError::WebSocketError(e.to_string()))?
                .forget();
        }
        self.remote.sent.lock().push(Sent::Audio(frame.clone()));
        Ok(())
    }

    async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> LiveResult<()> {
        self.remote.sent.lock().push(Sent::Tools(responses));
        Ok(())
    }

    async fn send_client_text(&self, text: &str) -> LiveResult<()> {
        self.remote.sent.lock().push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn close(&self) -> LiveResult<()> {
        self.remote.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockReceiver {
    units: mpsc::UnboundedReceiver<LiveResult<ResponseUnit>>,
}

#[async_trait]
impl LiveReceiver for MockReceiver {
    async fn next_unit(&mut self) -> LiveResult<Option<ResponseUnit>> {
        match self.units.recv().await {
            Some(Ok(unit)) => Ok(Some(unit)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Client transport fakes
// =============================================================================

/// Inbound source fed by a channel; counts frames handed to the relay.
pub struct ChannelSource {
    frames: mpsc::UnboundedReceiver<AudioFrame>,
    pub pulled: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
}

impl ChannelSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<AudioFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                frames: rx,
                pulled: Arc::new(AtomicUsize::new(0)),
                dropped: Arc::new(AtomicBool::new(false)),
            },
            tx,
        )
    }
}

impl Drop for ChannelSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl InboundSource for ChannelSource {
    async fn next_frame(&mut self) -> RelayResult<Option<AudioFrame>> {
        let frame = self.frames.recv().await;
        if frame.is_some() {
            self.pulled.fetch_add(1, Ordering::SeqCst);
        }
        Ok(frame)
    }
}

/// Sink recording every delivery with its (tokio) timestamp.
pub struct RecordingSink {
    paced: bool,
    pub delivered: Mutex<Vec<(Instant, AudioFrame)>>,
    pub notices: Mutex<Vec<ClientNotice>>,
    pub texts: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl RecordingSink {
    pub fn new(paced: bool) -> Arc<Self> {
        Arc::new(Self {
            paced,
            delivered: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// First payload byte of every delivered frame, used as a marker.
    pub fn markers(&self) -> Vec<u8> {
        self.delivered
            .lock()
            .iter()
            .map(|(_, f)| f.payload()[0])
            .collect()
    }
}

#[async_trait]
impl OutboundSink for RecordingSink {
    async fn deliver(&self, frame: &AudioFrame) -> RelayResult<()> {
        self.delivered.lock().push((Instant::now(), frame.clone()));
        Ok(())
    }

    fn paced(&self) -> bool {
        self.paced
    }

    async fn notify(&self, notice: ClientNotice) -> RelayResult<()> {
        self.notices.lock().push(notice);
        Ok(())
    }

    async fn text(&self, fragment: &str) -> RelayResult<()> {
        self.texts.lock().push(fragment.to_string());
        Ok(())
    }

    async fn close(&self) -> RelayResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// PCM frame of `len` bytes whose every byte is `marker`.
pub fn marked_frame(marker: u8, len: usize) -> AudioFrame {
    AudioFrame::pcm(vec![marker; len])
}

/// Poll `condition` until it holds, panicking after `limit`.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in {limit:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Config for the yoda_diagnostics assistant with every optional feature off.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        google_api_key: Some("test-key".to_string()),
        live_model: "gemini-2.0-flash-live-001".to_string(),
        live_api_version: "v1alpha".to_string(),
        live_endpoint: None,
        live_voice: "Puck".to_string(),
        live_response_modality: ResponseModality::Audio,
        live_turn_coverage: None,
        live_context_window_compression: None,
        live_setup_timeout_seconds: 5,
        assistant_name: "yoda_diagnostics".to_string(),
        assistant_tools: None,
        diagnostics_api_url: "http://127.0.0.1:9".to_string(),
        upstream_queue_capacity: 5,
        flush_on_turn_complete: true,
        remote_read_timeout_seconds: None,
        remote_write_timeout_seconds: Some(10),
        cors_allowed_origins: None,
        rate_limit_requests_per_second: 60,
        rate_limit_burst_size: 10,
        max_websocket_connections: None,
        max_connections_per_ip: 100,
    }
}
