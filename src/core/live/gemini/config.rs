//! Gemini Live API configuration types.
//!
//! - Endpoint and API version
//! - Model and voice selection
//! - Connection settings shared by every session

use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

/// Default Gemini Live websocket base (without API version).
pub const GEMINI_LIVE_BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws";

/// Default API version segment.
pub const DEFAULT_API_VERSION: &str = "v1alpha";

/// Default Live model.
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.0-flash-live-001";

/// Default deadline for the `setupComplete` handshake.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Sample rate of synthesized audio.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices offered by the Live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeminiVoice {
    /// Puck voice (default)
    #[default]
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    Zephyr,
}

impl GeminiVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Zephyr => "Zephyr",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "puck" => Self::Puck,
            "charon" => Self::Charon,
            "kore" => Self::Kore,
            "fenrir" => Self::Fenrir,
            "aoede" => Self::Aoede,
            "leda" => Self::Leda,
            "orus" => Self::Orus,
            "zephyr" => Self::Zephyr,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Connector Settings
// =============================================================================

/// Connection settings for [`super::GeminiLiveConnector`].
#[derive(Clone)]
pub struct GeminiLiveSettings {
    /// API key, sent as the `key` query parameter; wiped on drop
    pub api_key: Zeroizing<String>,
    /// API version path segment (e.g. `v1alpha`)
    pub api_version: String,
    /// Websocket base URL, overridable for tests
    pub base_url: String,
    /// Deadline for the setup handshake
    pub setup_timeout: Duration,
    /// Deadline for each remote read, none by default
    pub read_timeout: Option<Duration>,
    /// Deadline for each remote write
    pub write_timeout: Option<Duration>,
}

impl Default for GeminiLiveSettings {
    fn default() -> Self {
        Self {
            api_key: Zeroizing::new(String::new()),
            api_version: DEFAULT_API_VERSION.to_string(),
            base_url: GEMINI_LIVE_BASE_URL.to_string(),
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl std::fmt::Debug for GeminiLiveSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveSettings")
            .field("api_key", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("setup_timeout", &self.setup_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

impl GeminiLiveSettings {
    /// Websocket URL for the bidirectional generate-content service.
    pub fn ws_url(&self) -> String {
        format!(
            "{}/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            self.api_key.as_str()
        )
    }
}

/// Prefix a bare model id with `models/` as the setup message expects.
pub fn qualified_model_name(model: &str) -> String {
    let model = if model.is_empty() {
        DEFAULT_LIVE_MODEL
    } else {
        model
    };
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}
