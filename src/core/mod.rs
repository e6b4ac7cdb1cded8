pub mod audio;
pub mod live;
pub mod relay;
pub mod tools;

// Re-export commonly used types for convenience
pub use audio::{AudioFrame, MediaType, PcmFormat};

pub use live::{
    ConversationConfig, FunctionCall, FunctionResponse, GeminiLiveConnector, GeminiLiveSettings,
    LiveConnector, LiveError, LiveReceiver, LiveResult, LiveSender, ResponseUnit, TurnSignal,
};

pub use relay::{
    ClientNotice, InboundSource, OutboundQueue, OutboundSink, RelayError, RelayResult,
    RelaySession, RelaySettings, SessionState,
};

pub use tools::{AssistantProfile, ToolError, ToolHandler, ToolName, ToolRegistry, ToolResult};
