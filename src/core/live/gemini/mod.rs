//! Gemini Live API module.
//!
//! Bidirectional audio streaming against Google's `BidiGenerateContent`
//! websocket service.
//!
//! # Audio Format
//!
//! Input is PCM 16-bit signed little-endian at 16kHz, output at 24kHz.
//!
//! # Example
//!
//! ```rust,ignore
//! use vaani_gateway::core::live::{ConversationConfig, LiveConnector};
//! use vaani_gateway::core::live::gemini::{GeminiLiveConnector, GeminiLiveSettings};
//!
//! let connector = GeminiLiveConnector::new(GeminiLiveSettings {
//!     api_key: std::env::var("GOOGLE_API_KEY")?.into(),
//!     ..Default::default()
//! })?;
//! let (sender, mut receiver) = connector.connect(&ConversationConfig::default()).await?;
//! sender.send_realtime_input(&frame).await?;
//! while let Some(unit) = receiver.next_unit().await? {
//!     println!("{unit:?}");
//! }
//! ```

mod client;
mod config;
mod messages;

pub use client::{GeminiLiveConnector, GeminiLiveReceiver, GeminiLiveSender};
pub use config::{
    DEFAULT_API_VERSION, DEFAULT_LIVE_MODEL, DEFAULT_SETUP_TIMEOUT, GEMINI_LIVE_BASE_URL,
    GEMINI_OUTPUT_SAMPLE_RATE, GeminiLiveSettings, GeminiVoice, qualified_model_name,
};
pub use messages::{ClientMessage, ServerMessage};
