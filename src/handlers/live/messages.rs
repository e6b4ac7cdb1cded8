//! Client wire format for the live websocket.
//!
//! Client to server (text or binary frame carrying JSON):
//!
//! ```json
//! {"realtime_input": {"media_chunks": [{"mime_type": "audio/pcm", "data": "<base64>"}]}}
//! ```
//!
//! Server to client:
//!
//! ```json
//! {"audio": "<base64 PCM 24kHz>"}
//! {"assistant_activity": "TOOL called - get_test_details"}
//! {"model_error": "Live API error: ..."}
//! ```

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::audio::{AudioFrame, MediaType};
use crate::core::relay::{ClientNotice, RelayError, RelayResult};

/// Inbound message from the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default)]
    pub realtime_input: Option<RealtimeInputEnvelope>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealtimeInputEnvelope {
    #[serde(default)]
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl ClientEnvelope {
    /// Parse a JSON envelope.
    pub fn decode(raw: &[u8]) -> RelayResult<Self> {
        serde_json::from_slice(raw).map_err(|e| RelayError::Decode(e.to_string()))
    }

    /// Audio frames carried by this envelope, in order.
    ///
    /// Chunks with a media type other than PCM or with invalid base64 are
    /// dropped individually; an envelope without `realtime_input` yields nothing.
    pub fn into_frames(self) -> Vec<AudioFrame> {
        let Some(input) = self.realtime_input else {
            return Vec::new();
        };

        input
            .media_chunks
            .into_iter()
            .filter_map(|chunk| {
                let Some(media_type) = MediaType::parse(&chunk.mime_type) else {
                    tracing::debug!(mime_type = %chunk.mime_type, "Dropping non-PCM chunk");
                    return None;
                };
                match BASE64_STANDARD.decode(chunk.data.as_bytes()) {
                    Ok(pcm) => Some(AudioFrame::new(pcm, media_type)),
                    Err(e) => {
                        tracing::warn!("Dropping chunk with invalid base64: {}", e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Outbound message to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// Base64 PCM audio
    Audio(String),
    AssistantActivity(String),
    ModelError(String),
}

impl ServerEnvelope {
    pub fn audio(frame: &AudioFrame) -> Self {
        Self::Audio(BASE64_STANDARD.encode(frame.payload()))
    }
}

impl From<ClientNotice> for ServerEnvelope {
    fn from(notice: ClientNotice) -> Self {
        match notice {
            ClientNotice::AssistantActivity(message) => Self::AssistantActivity(message),
            ClientNotice::ModelError(message) => Self::ModelError(message),
        }
    }
}

/// Work item for the websocket writer task.
#[derive(Debug)]
pub enum LiveMessageRoute {
    Outgoing(ServerEnvelope),
    Close,
}
