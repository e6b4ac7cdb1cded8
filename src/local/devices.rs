//! cpal-backed capture and playback devices.
//!
//! cpal streams are not `Send`, so each stream lives on its own thread for
//! as long as the device handle exists. Samples cross between the stream
//! callback and the relay through the wait-free rings in [`super::ring`].

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::ring::{CaptureReader, PlaybackWriter, capture_ring, playback_ring};
use crate::core::audio::{CAPTURE_FRAME_SAMPLES, PcmFormat};
use crate::core::relay::{CaptureDevice, PlaybackDevice, RelayError, RelayResult};

/// Audio buffered ahead of the speaker before `write_frame` blocks.
const MAX_PLAYBACK_LEAD: Duration = Duration::from_millis(200);

fn device_error(e: impl std::fmt::Display) -> RelayError {
    RelayError::Device(e.to_string())
}

fn stream_config(format: PcmFormat) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Owns the thread that keeps a cpal stream alive.
struct StreamThread {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Build a stream on a dedicated thread and keep it playing until dropped.
    fn spawn<B>(name: &str, build: B) -> RelayResult<Self>
    where
        B: FnOnce() -> RelayResult<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<RelayResult<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(device_error(e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Blocks until a stop message arrives or the sender is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(device_error)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop: Some(stop_tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RelayError::Device(format!("{name} thread exited early"))),
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Capture
// =============================================================================

/// Default microphone, delivering 16-bit mono PCM frames of
/// [`CAPTURE_FRAME_SAMPLES`] samples at 16kHz.
pub struct CpalCapture {
    frames: CaptureReader,
    _stream: StreamThread,
}

impl CpalCapture {
    pub fn open_default() -> RelayResult<Self> {
        let format = PcmFormat::CAPTURE;
        let (mut writer, frames) =
            capture_ring(format, CAPTURE_FRAME_SAMPLES * format.channels as usize);

        let stream = StreamThread::spawn("vaani-capture", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| RelayError::Device("no default input device".to_string()))?;
            tracing::info!(device = ?device.name().ok(), "Opening capture device");

            device
                .build_input_stream(
                    &stream_config(format),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        // Overflow means the relay fell behind; those samples are lost.
                        writer.push(data);
                    },
                    |e| tracing::error!("Capture stream error: {}", e),
                    None,
                )
                .map_err(device_error)
        })?;

        Ok(Self {
            frames,
            _stream: stream,
        })
    }
}

impl CaptureDevice for CpalCapture {
    fn read_frame(&mut self) -> RelayResult<Option<Bytes>> {
        Ok(self.frames.read_frame())
    }
}

// =============================================================================
// Playback
// =============================================================================

/// Default speaker, playing 16-bit mono PCM at 24kHz.
pub struct CpalPlayback {
    samples: PlaybackWriter,
    stream: StreamThread,
}

impl CpalPlayback {
    pub fn open_default() -> RelayResult<Self> {
        let format = PcmFormat::PLAYBACK;
        let (samples, mut reader) = playback_ring(format, MAX_PLAYBACK_LEAD);

        let stream = StreamThread::spawn("vaani-playback", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| RelayError::Device("no default output device".to_string()))?;
            tracing::info!(device = ?device.name().ok(), "Opening playback device");

            device
                .build_output_stream(
                    &stream_config(format),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        reader.fill(data);
                    },
                    |e| tracing::error!("Playback stream error: {}", e),
                    None,
                )
                .map_err(device_error)
        })?;

        Ok(Self { samples, stream })
    }
}

impl PlaybackDevice for CpalPlayback {
    fn write_frame(&mut self, pcm: &[u8]) -> RelayResult<()> {
        self.samples.write_pcm(pcm)
    }

    fn close(&mut self) -> RelayResult<()> {
        // Dropping the stream drops the ring's reader and whatever it still held.
        self.stream.stop();
        Ok(())
    }
}
