//! Gemini Live API websocket message types.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server), each a single-key JSON object:
//! - `setup` - Session configuration, always the first message
//! - `realtimeInput` - Streaming audio input
//! - `clientContent` - A typed user turn
//! - `toolResponse` - Results for a batch of function calls
//!
//! Server messages (received from server), one or more of:
//! - `setupComplete` - Handshake acknowledged
//! - `serverContent` - Model turn parts, `turnComplete`, `interrupted`
//! - `toolCall` - Function calls requested by the model
//! - `toolCallCancellation` - Previously issued calls that were cancelled
//! - `usageMetadata` - Token accounting
//! - `goAway` - Server is about to disconnect
//!
//! Server frames may arrive as text or binary; both carry the same JSON.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{GeminiVoice, qualified_model_name};
use crate::core::audio::{AudioFrame, CAPTURE_SAMPLE_RATE, MediaType};
use crate::core::live::base::{
    ContextWindowCompression, ConversationConfig, FunctionCall, FunctionDeclaration,
    FunctionResponse, ResponseModality, ResponseUnit, TurnCoverage, TurnSignal,
};

// =============================================================================
// Client Messages
// =============================================================================

/// Client-to-server message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration
    Setup(Setup),
    /// Realtime audio input
    RealtimeInput(RealtimeInput),
    /// Typed conversation turns
    ClientContent(ClientContent),
    /// Function call results
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Build the setup message from a conversation configuration.
    pub fn setup(config: &ConversationConfig) -> Self {
        let speech_config = match (config.response_modality, config.voice.as_deref()) {
            (ResponseModality::Audio, voice) => Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice
                            .map(GeminiVoice::from_str_or_default)
                            .unwrap_or_default()
                            .as_str()
                            .to_string(),
                    },
                },
            }),
            (ResponseModality::Text, _) => None,
        };

        let tools = if config.tools.is_empty() {
            None
        } else {
            Some(vec![Tool {
                function_declarations: config.tools.clone(),
            }])
        };

        ClientMessage::Setup(Setup {
            model: qualified_model_name(&config.model),
            generation_config: GenerationConfig {
                response_modalities: vec![config.response_modality],
                speech_config,
            },
            system_instruction: config.system_instruction.as_ref().map(|text| Content {
                parts: vec![TextPart { text: text.clone() }],
            }),
            tools,
            realtime_input_config: config
                .turn_coverage
                .map(|turn_coverage| RealtimeInputConfig { turn_coverage }),
            context_window_compression: config.context_window_compression.map(
                |ContextWindowCompression {
                     trigger_tokens,
                     target_tokens,
                 }| CompressionConfig {
                    trigger_tokens,
                    sliding_window: SlidingWindow { target_tokens },
                },
            ),
        })
    }

    /// Wrap an audio frame as realtime input, base64-encoding the payload.
    pub fn realtime_audio(frame: &AudioFrame) -> Self {
        let mime_type = match frame.media_type() {
            MediaType::Pcm { rate: None } => MediaType::Pcm {
                rate: Some(CAPTURE_SAMPLE_RATE),
            }
            .as_mime(),
            other => other.as_mime(),
        };
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Blob {
                mime_type,
                data: BASE64_STANDARD.encode(frame.payload()),
            },
        })
    }

    /// A complete user turn made of one text part.
    pub fn user_text(text: &str) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Turn {
                role: "user".to_string(),
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
            }],
            turn_complete: true,
        })
    }

    pub fn tool_response(function_responses: Vec<FunctionResponse>) -> Self {
        ClientMessage::ToolResponse(ToolResponse { function_responses })
    }
}

/// `setup` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_input_config: Option<RealtimeInputConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputConfig {
    pub turn_coverage: TurnCoverage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionConfig {
    pub trigger_tokens: u64,
    pub sliding_window: SlidingWindow,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlidingWindow {
    pub target_tokens: u64,
}

/// `realtimeInput` payload.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInput {
    pub audio: Blob,
}

/// `clientContent` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Turn>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

/// Base64 media blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// `toolResponse` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

// =============================================================================
// Server Messages
// =============================================================================

/// Server-to-client message. Any subset of fields may be present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub generation_complete: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default)]
    pub response_token_count: Option<u64>,
    #[serde(default)]
    pub total_token_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Parse a server frame body (text or binary).
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flatten into response units.
    ///
    /// Units come out as interruption, model parts, tool calls, turn completion.
    /// Parts that cannot be decoded are logged and skipped.
    pub fn into_units(self) -> Vec<ResponseUnit> {
        let mut units = Vec::new();

        if let Some(cancellation) = &self.tool_call_cancellation {
            tracing::debug!(ids = ?cancellation.ids, "Tool calls cancelled by server");
        }
        if let Some(usage) = &self.usage_metadata {
            tracing::debug!(total_tokens = ?usage.total_token_count, "Live usage metadata");
        }
        if let Some(go_away) = &self.go_away {
            tracing::warn!(time_left = ?go_away.time_left, "Live server sent goAway");
        }

        let mut turn_complete = false;
        if let Some(content) = self.server_content {
            if content.interrupted {
                units.push(ResponseUnit::Control(TurnSignal::Interrupted));
            }
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(blob) = part.inline_data {
                        if let Some(frame) = decode_audio(blob) {
                            units.push(ResponseUnit::Audio(frame));
                        }
                    } else if let Some(text) = part.text {
                        units.push(ResponseUnit::Text(text));
                    }
                }
            }
            if content.generation_complete {
                tracing::trace!("Generation complete");
            }
            turn_complete = content.turn_complete;
        }

        if let Some(tool_call) = self.tool_call
            && !tool_call.function_calls.is_empty()
        {
            units.push(ResponseUnit::ToolCall(tool_call.function_calls));
        }

        if turn_complete {
            units.push(ResponseUnit::Control(TurnSignal::TurnComplete));
        }

        units
    }
}

fn decode_audio(blob: Blob) -> Option<AudioFrame> {
    let Some(media_type) = MediaType::parse(&blob.mime_type) else {
        tracing::debug!(mime_type = %blob.mime_type, "Skipping non-audio inline data");
        return None;
    };
    match BASE64_STANDARD.decode(blob.data.as_bytes()) {
        Ok(bytes) => Some(AudioFrame::new(bytes, media_type)),
        Err(e) => {
            tracing::warn!("Failed to decode inline audio: {}", e);
            None
        }
    }
}
