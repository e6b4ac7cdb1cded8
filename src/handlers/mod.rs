//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoints
//! - `live` - Live websocket relay to the Live API

pub mod api;
pub mod live;

// Re-export commonly used handlers for convenient access
pub use live::live_handler;
