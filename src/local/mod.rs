//! Local microphone/speaker relay.
//!
//! This module powers the `vaani-gateway local` CLI command: instead of a
//! websocket client, the default capture device feeds the session and the
//! default playback device plays the assistant's answer. Lines typed on the
//! console go to the model as user turns, and `q` ends the session.
//!
//! ```text
//! $ GOOGLE_API_KEY=... vaani-gateway local
//! ```
//!
//! Device access needs the `local-audio` feature (cpal). [`relay_devices`]
//! itself works with any [`CaptureDevice`] / [`PlaybackDevice`] pair.

#[cfg(feature = "local-audio")]
mod devices;
pub mod ring;

use std::future::Future;
use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::core::live::LiveError;
use crate::core::relay::{
    CaptureDevice, DeviceSink, DeviceSource, InboundSource, OutboundSink, PlaybackDevice,
    RelayError, RelayResult, RelaySession,
};
use crate::state::AppState;

#[cfg(feature = "local-audio")]
pub use devices::{CpalCapture, CpalPlayback};

/// Typing this line on the console ends the local session.
pub const QUIT_COMMAND: &str = "q";

/// Relay one session between blocking audio devices and the Live API.
///
/// Runs until the remote stream ends, a device fails, or `shutdown` resolves.
pub async fn relay_devices<C, P, F>(
    state: &AppState,
    capture: C,
    playback: P,
    shutdown: F,
) -> RelayResult<()>
where
    C: CaptureDevice,
    P: PlaybackDevice,
    F: Future<Output = ()> + Send + 'static,
{
    relay_devices_with_text(state, capture, playback, None, shutdown).await
}

/// [`relay_devices`], also sending each line from `lines` as a user turn.
pub async fn relay_devices_with_text<C, P, F>(
    state: &AppState,
    capture: C,
    playback: P,
    lines: Option<mpsc::Receiver<String>>,
    shutdown: F,
) -> RelayResult<()>
where
    C: CaptureDevice,
    P: PlaybackDevice,
    F: Future<Output = ()> + Send + 'static,
{
    let connector = state.connector().ok_or_else(|| {
        RelayError::Remote(LiveError::AuthenticationFailed(
            "GOOGLE_API_KEY is not set".to_string(),
        ))
    })?;

    let mut session = RelaySession::new(
        connector,
        state.registry.clone(),
        state.conversation.clone(),
        state.relay_settings.clone(),
    );
    if let Some(lines) = lines {
        session = session.with_text_input(lines);
    }
    let session_id = session.id();

    let cancel = session.cancellation_token();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            _ = shutdown => {
                tracing::info!(%session_id, "Shutdown requested");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });

    let source: Box<dyn InboundSource> = Box::new(DeviceSource::new(capture));
    let sink: Arc<dyn OutboundSink> = Arc::new(DeviceSink::new(playback));
    let result = session.run(Some(source), sink).await;

    watcher.abort();
    result
}

/// Forward console lines until EOF, the receiver closing, or [`QUIT_COMMAND`].
///
/// Blocking. The quit command cancels `quit` and is not forwarded.
pub fn forward_console_lines<R: BufRead>(
    input: R,
    lines: mpsc::Sender<String>,
    quit: CancellationToken,
) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim() == QUIT_COMMAND {
            tracing::info!("Quit requested from console");
            quit.cancel();
            return;
        }
        if lines.blocking_send(line).is_err() {
            return;
        }
    }
    tracing::debug!("Console input closed");
}

/// Read stdin on its own thread.
///
/// A detached thread rather than `spawn_blocking`: a read parked on stdin
/// would otherwise hold up runtime shutdown.
#[cfg(feature = "local-audio")]
fn spawn_console(quit: CancellationToken) -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::Builder::new()
        .name("vaani-console".to_string())
        .spawn(move || forward_console_lines(std::io::stdin().lock(), tx, quit))?;
    Ok(rx)
}

/// Run the local relay on the default devices until Ctrl-C or `q`.
#[cfg(feature = "local-audio")]
pub async fn run(config: ServerConfig) -> Result<()> {
    let state = AppState::new(config).await?;

    let capture = CpalCapture::open_default().map_err(|e| anyhow!(e.to_string()))?;
    let playback = CpalPlayback::open_default().map_err(|e| anyhow!(e.to_string()))?;

    let quit = CancellationToken::new();
    let lines = spawn_console(quit.clone())?;

    println!("Please start speaking... start by saying hello!");
    println!("Type a message and press Enter to send it, or `{QUIT_COMMAND}` to quit.");
    relay_devices_with_text(&state, capture, playback, Some(lines), async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = quit.cancelled() => {}
        }
    })
    .await
    .map_err(|e| anyhow!(e.to_string()))
}

#[cfg(not(feature = "local-audio"))]
pub async fn run(_config: ServerConfig) -> Result<()> {
    Err(anyhow!(
        "`vaani-gateway local` requires the `local-audio` feature. \
         Rebuild with `--features local-audio` to use the microphone and speaker."
    ))
}
