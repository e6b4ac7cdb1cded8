//! Client-side transports: where inbound audio comes from and where agent audio goes.
//!
//! Push transports (websocket) implement the traits directly. Pull transports
//! (local devices) implement the blocking [`CaptureDevice`] / [`PlaybackDevice`]
//! traits and are adapted by [`DeviceSource`] / [`DeviceSink`], which run each
//! blocking call on the blocking thread pool.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{RelayError, RelayResult};
use crate::core::audio::{AudioFrame, MediaType, PcmFormat};

/// Status or error notice for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotice {
    /// Informational activity (tool calls and their results)
    AssistantActivity(String),
    /// The session failed and is about to close
    ModelError(String),
}

/// Source of inbound client audio.
#[async_trait]
pub trait InboundSource: Send {
    /// Next valid frame, or `None` once the transport is closed or exhausted.
    ///
    /// Malformed input is dropped inside the source and never returned as an error.
    async fn next_frame(&mut self) -> RelayResult<Option<AudioFrame>>;
}

/// Destination for agent audio, text and notices.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Deliver one audio frame.
    async fn deliver(&self, frame: &AudioFrame) -> RelayResult<()>;

    /// Whether delivery returns before the audio has played, so the
    /// dispatcher must wait out each frame's playback time itself.
    fn paced(&self) -> bool;

    async fn notify(&self, notice: ClientNotice) -> RelayResult<()>;

    /// Model text output.
    async fn text(&self, fragment: &str) -> RelayResult<()> {
        tracing::info!(text = %fragment, "Model text");
        Ok(())
    }

    /// Release the transport. Called once when the session closes.
    async fn close(&self) -> RelayResult<()>;
}

// =============================================================================
// Blocking devices
// =============================================================================

/// Blocking microphone-like device.
pub trait CaptureDevice: Send + 'static {
    /// Block until one frame of PCM is available. `None` means end of input.
    fn read_frame(&mut self) -> RelayResult<Option<Bytes>>;

    fn format(&self) -> PcmFormat {
        PcmFormat::CAPTURE
    }
}

/// Blocking speaker-like device. `write_frame` returns once the audio is queued for playback.
pub trait PlaybackDevice: Send + 'static {
    fn write_frame(&mut self, pcm: &[u8]) -> RelayResult<()>;

    /// Release the device.
    fn close(&mut self) -> RelayResult<()> {
        Ok(())
    }
}

/// [`InboundSource`] over a blocking capture device.
pub struct DeviceSource<C: CaptureDevice> {
    device: Option<C>,
}

impl<C: CaptureDevice> DeviceSource<C> {
    pub fn new(device: C) -> Self {
        Self {
            device: Some(device),
        }
    }
}

#[async_trait]
impl<C: CaptureDevice> InboundSource for DeviceSource<C> {
    async fn next_frame(&mut self) -> RelayResult<Option<AudioFrame>> {
        let Some(mut device) = self.device.take() else {
            return Ok(None);
        };
        let rate = device.format().sample_rate;

        let (device, result) = tokio::task::spawn_blocking(move || {
            let result = device.read_frame();
            (device, result)
        })
        .await
        .map_err(|e| RelayError::Task(e.to_string()))?;

        match result? {
            Some(pcm) => {
                self.device = Some(device);
                Ok(Some(AudioFrame::new(pcm, MediaType::Pcm { rate: Some(rate) })))
            }
            None => Ok(None),
        }
    }
}

/// [`OutboundSink`] over a blocking playback device.
///
/// Text goes to stdout and notices to the log, since a speaker has no other channel.
pub struct DeviceSink<P: PlaybackDevice> {
    device: Arc<Mutex<P>>,
    text_out: Mutex<Box<dyn Write + Send>>,
}

impl<P: PlaybackDevice> DeviceSink<P> {
    pub fn new(device: P) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            text_out: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    /// Print model text to `out` instead of stdout.
    pub fn with_text_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.text_out = Mutex::new(Box::new(out));
        self
    }
}

#[async_trait]
impl<P: PlaybackDevice> OutboundSink for DeviceSink<P> {
    async fn deliver(&self, frame: &AudioFrame) -> RelayResult<()> {
        let device = self.device.clone();
        let pcm = frame.payload().clone();
        tokio::task::spawn_blocking(move || device.lock().write_frame(&pcm))
            .await
            .map_err(|e| RelayError::Task(e.to_string()))?
    }

    fn paced(&self) -> bool {
        false
    }

    async fn notify(&self, notice: ClientNotice) -> RelayResult<()> {
        match notice {
            ClientNotice::AssistantActivity(activity) => tracing::info!("{}", activity),
            ClientNotice::ModelError(error) => tracing::error!("Model error: {}", error),
        }
        Ok(())
    }

    async fn text(&self, fragment: &str) -> RelayResult<()> {
        // Fragments rarely end in a newline, so flush each one.
        let mut out = self.text_out.lock();
        let written = out.write_all(fragment.as_bytes());
        written
            .and_then(|()| out.flush())
            .map_err(|e| RelayError::ClientTransport(e.to_string()))
    }

    async fn close(&self) -> RelayResult<()> {
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || device.lock().close())
            .await
            .map_err(|e| RelayError::Task(e.to_string()))?
    }
}
