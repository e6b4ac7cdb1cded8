//! Live websocket handlers
//!
//! Relays a client's microphone audio to the Live API and streams the
//! assistant's spoken answer back, with local tool calls in between.
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **realtime_input**: `{"realtime_input": {"media_chunks": [{"mime_type": "audio/pcm", "data": "<base64>"}]}}`
//!   carrying 16-bit PCM at 16kHz mono. Other media types are ignored.
//!
//! ## Server → Client
//!
//! - **audio**: `{"audio": "<base64>"}`, 16-bit PCM at 24kHz mono, sent at playback speed
//! - **assistant_activity**: tool calls and their results, for display
//! - **model_error**: the session failed and the socket is about to close

mod handler;
pub mod messages;

pub use handler::{WebSocketSink, WebSocketSource, handle_live_socket, live_handler};
