//! Bidirectional realtime relay between a client transport and the Live API.
//!
//! A [`RelaySession`] runs four flows concurrently:
//!
//! - **Inbound collector**: client transport -> upstream queue (bounded)
//! - **Upstream sender**: upstream queue -> Live API realtime input
//! - **Downstream receiver**: Live API -> outbound queue, tool dispatch, turn signals
//! - **Outbound dispatcher**: outbound queue -> client transport (paced)
//!
//! The two queues are the only state shared between flows.

pub mod flows;
pub mod queue;
pub mod session;
pub mod transport;

use thiserror::Error;

use crate::core::live::LiveError;

pub use flows::FlowKind;
pub use queue::{DEFAULT_UPSTREAM_CAPACITY, OutboundQueue, upstream_queue};
pub use session::{RelaySession, RelaySettings, SessionState};
pub use transport::{
    CaptureDevice, ClientNotice, DeviceSink, DeviceSource, InboundSource, OutboundSink,
    PlaybackDevice,
};

/// Errors that end a relay flow.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The Live API stream failed
    #[error("Live API error: {0}")]
    Remote(#[from] LiveError),

    /// The client transport failed
    #[error("Client transport error: {0}")]
    ClientTransport(String),

    /// A local capture or playback device failed
    #[error("Audio device error: {0}")]
    Device(String),

    /// An inbound message could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A flow task panicked or could not be joined
    #[error("Task error: {0}")]
    Task(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
