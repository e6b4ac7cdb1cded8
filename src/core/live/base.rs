//! Base traits and types for Live API collaborators.
//!
//! A Live API session is a bidirectional stream: the gateway pushes realtime
//! audio input and tool results up, and reads a stream of response units
//! (audio, text, tool calls, turn control) down. The traits here keep the
//! relay independent of the vendor client so sessions can be driven by a
//! mock in tests.
//!
//! # Audio Format
//!
//! Realtime input is PCM 16-bit at 16kHz, synthesized output is PCM 16-bit
//! at 24kHz. Both are mono little-endian.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;

use crate::core::audio::AudioFrame;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the Live API.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The provider sent something the client could not make sense of
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// The remote stream was closed
    #[error("Stream closed: {0}")]
    Closed(String),
}

/// Result type for Live API operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Conversation Configuration
// =============================================================================

/// Modality the model answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    /// Synthesized speech (default)
    #[default]
    Audio,
    /// Text only
    Text,
}

impl ResponseModality {
    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" => Self::Text,
            _ => Self::Audio,
        }
    }
}

/// Which input counts towards a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnCoverage {
    /// Only audio detected as speech activity is part of the turn
    #[serde(rename = "TURN_INCLUDES_ONLY_ACTIVITY")]
    OnlyActivity,
    /// All realtime input since the last turn is part of the turn
    #[serde(rename = "TURN_INCLUDES_ALL_INPUT")]
    AllInput,
}

impl TurnCoverage {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "only_activity" | "turn_includes_only_activity" => Some(Self::OnlyActivity),
            "all_input" | "turn_includes_all_input" => Some(Self::AllInput),
            _ => None,
        }
    }
}

/// Sliding-window context compression thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindowCompression {
    /// Token count that triggers compression
    pub trigger_tokens: u64,
    /// Token count the window is compressed down to
    pub target_tokens: u64,
}

/// How the relay reacts to turn control signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptionPolicy {
    /// Discard queued agent audio when a turn completes, not only on interruption.
    pub flush_on_turn_complete: bool,
}

impl Default for InterruptionPolicy {
    fn default() -> Self {
        Self {
            flush_on_turn_complete: true,
        }
    }
}

/// Function declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Immutable per-session conversation configuration.
///
/// Set once when the remote stream is opened and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationConfig {
    /// Model to use (e.g., "gemini-2.0-flash-live-001")
    pub model: String,
    /// System instructions for the assistant
    pub system_instruction: Option<String>,
    /// Response modality
    pub response_modality: ResponseModality,
    /// Prebuilt voice for audio output
    pub voice: Option<String>,
    /// Tool declarations for function calling
    pub tools: Vec<FunctionDeclaration>,
    /// Turn coverage for realtime input
    pub turn_coverage: Option<TurnCoverage>,
    /// Interruption handling
    pub interruption: InterruptionPolicy,
    /// Optional context-window compression
    pub context_window_compression: Option<ContextWindowCompression>,
}

// =============================================================================
// Response Units
// =============================================================================

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Invocation id, echoed back unchanged in the response
    #[serde(default)]
    pub id: String,
    /// Function name
    pub name: String,
    /// Named arguments
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Result of one tool invocation, correlated by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
    /// Always false: the relay never streams partial results for an id.
    pub will_continue: bool,
}

impl FunctionResponse {
    /// Successful result, wrapped as `{"result": value}`.
    pub fn success(call: &FunctionCall, result: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "result": result }),
            will_continue: false,
        }
    }

    /// Failed result, wrapped as `{"error": message}`.
    pub fn failure(call: &FunctionCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "error": message.into() }),
            will_continue: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// Turn control signal from the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    /// The model finished its turn
    TurnComplete,
    /// The user started speaking over the model
    Interrupted,
}

impl fmt::Display for TurnSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnSignal::TurnComplete => write!(f, "turn_complete"),
            TurnSignal::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// One item yielded by the remote stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseUnit {
    /// Synthesized audio
    Audio(AudioFrame),
    /// Text fragment
    Text(String),
    /// Tool invocations, in arrival order
    ToolCall(Vec<FunctionCall>),
    /// Turn boundary or interruption
    Control(TurnSignal),
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Write half of a Live API session.
///
/// Implementations must be safe to call from the upstream sender and the
/// downstream receiver at the same time.
#[async_trait]
pub trait LiveSender: Send + Sync {
    /// Forward one audio frame as realtime input.
    async fn send_realtime_input(&self, frame: &AudioFrame) -> LiveResult<()>;

    /// Send a batch of tool results in one call.
    async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> LiveResult<()>;

    /// Send typed text as a complete user turn.
    async fn send_client_text(&self, text: &str) -> LiveResult<()>;

    /// Close the remote stream. Idempotent.
    async fn close(&self) -> LiveResult<()>;
}

/// Read half of a Live API session.
#[async_trait]
pub trait LiveReceiver: Send {
    /// Next response unit, or `None` once the remote stream has closed.
    async fn next_unit(&mut self) -> LiveResult<Option<ResponseUnit>>;
}

/// Boxed write half.
pub type BoxedLiveSender = Box<dyn LiveSender>;

/// Boxed read half.
pub type BoxedLiveReceiver = Box<dyn LiveReceiver>;

/// Opens Live API sessions.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a remote stream configured with `config`.
    async fn connect(
        &self,
        config: &ConversationConfig,
    ) -> LiveResult<(BoxedLiveSender, BoxedLiveReceiver)>;
}
