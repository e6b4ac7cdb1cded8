//! Live API abstraction and providers.
//!
//! The relay only sees [`LiveConnector`], [`LiveSender`] and [`LiveReceiver`];
//! the Gemini client is one implementation.

pub mod base;
pub mod gemini;

pub use base::{
    BoxedLiveReceiver, BoxedLiveSender, ContextWindowCompression, ConversationConfig,
    FunctionCall, FunctionDeclaration, FunctionResponse, InterruptionPolicy, LiveConnector,
    LiveError, LiveReceiver, LiveResult, LiveSender, ResponseModality, ResponseUnit,
    TurnCoverage, TurnSignal,
};
pub use gemini::{GeminiLiveConnector, GeminiLiveSettings};
