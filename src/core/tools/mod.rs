//! Locally served tools the model may call during a session.
//!
//! Tools are a closed set ([`ToolName`]). Each assistant profile owns a subset
//! of them; the [`ToolRegistry`] maps `(assistant, tool)` to a typed
//! [`ToolHandler`]. Unknown names never reach a handler: they are rejected
//! when parsing configuration, and at call time they turn into a failed
//! [`FunctionResponse`] for the model.

pub mod assistants;
pub mod diagnostics;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::live::{FunctionCall, FunctionDeclaration, FunctionResponse};

pub use assistants::{AssistantProfile, SessionOptions, YODA_DIAGNOSTICS};
pub use diagnostics::{
    BookAppointmentArgs, BookAppointmentTool, DEFAULT_DIAGNOSTICS_API_URL, DiagnosticsClient,
    HealthPackagesTool, TestDetailsTool,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while running a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool by that name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// No assistant profile by that name
    #[error("Unknown assistant: {0}")]
    UnknownAssistant(String),

    /// Arguments did not match the tool's schema
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: ToolName, message: String },

    /// Upstream HTTP call failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream response did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Any other failure inside the tool
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// Result type for tool calls.
pub type ToolResult<T> = Result<T, ToolError>;

// =============================================================================
// Tool Identifiers
// =============================================================================

/// Every tool the gateway can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    GetHealthPackages,
    GetTestDetails,
    BookAppointment,
}

impl ToolName {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetHealthPackages => "get_health_packages",
            ToolName::GetTestDetails => "get_test_details",
            ToolName::BookAppointment => "book_appointment",
        }
    }

    pub fn all() -> &'static [ToolName] {
        &[
            ToolName::GetHealthPackages,
            ToolName::GetTestDetails,
            ToolName::BookAppointment,
        ]
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get_health_packages" => Ok(ToolName::GetHealthPackages),
            "get_test_details" => Ok(ToolName::GetTestDetails),
            "book_appointment" => Ok(ToolName::BookAppointment),
            _ => Err(ToolError::UnknownTool(s.to_string())),
        }
    }
}

// =============================================================================
// Handler Trait
// =============================================================================

/// A single callable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> ToolName;

    /// Declaration advertised to the model in the session setup.
    fn declaration(&self) -> FunctionDeclaration;

    async fn call(&self, args: &Map<String, Value>) -> ToolResult<Value>;
}

// =============================================================================
// Registry
// =============================================================================

/// Tool handlers grouped by assistant profile.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    assistants: HashMap<String, Vec<Arc<dyn ToolHandler>>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (assistant, handlers) in &self.assistants {
            let names: Vec<_> = handlers.iter().map(|h| h.name().as_str()).collect();
            map.entry(assistant, &names);
        }
        map.finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in assistant and its diagnostics tools.
    pub fn with_builtin(client: DiagnosticsClient) -> Self {
        let mut registry = Self::new();
        registry.register_profile(&YODA_DIAGNOSTICS, &client);
        registry
    }

    /// Register the handlers an assistant profile lists.
    pub fn register_profile(&mut self, profile: &AssistantProfile, client: &DiagnosticsClient) {
        self.register_tools(profile.name, profile.tools, client);
    }

    /// Register built-in handlers for the given tools under an assistant.
    pub fn register_tools(
        &mut self,
        assistant: &str,
        tools: &[ToolName],
        client: &DiagnosticsClient,
    ) {
        for tool in tools {
            let handler: Arc<dyn ToolHandler> = match tool {
                ToolName::GetHealthPackages => Arc::new(HealthPackagesTool::new(client.clone())),
                ToolName::GetTestDetails => Arc::new(TestDetailsTool::new(client.clone())),
                ToolName::BookAppointment => Arc::new(BookAppointmentTool),
            };
            self.register(assistant, handler);
        }
    }

    /// Register a handler for an assistant, replacing one with the same name.
    pub fn register(&mut self, assistant: &str, handler: Arc<dyn ToolHandler>) {
        let handlers = self.assistants.entry(assistant.to_string()).or_default();
        handlers.retain(|h| h.name() != handler.name());
        handlers.push(handler);
    }

    pub fn has_assistant(&self, assistant: &str) -> bool {
        self.assistants.contains_key(assistant)
    }

    /// Tool declarations for an assistant, in registration order.
    pub fn declarations(&self, assistant: &str) -> Vec<FunctionDeclaration> {
        self.assistants
            .get(assistant)
            .map(|handlers| handlers.iter().map(|h| h.declaration()).collect())
            .unwrap_or_default()
    }

    fn lookup(&self, assistant: &str, name: &str) -> ToolResult<Arc<dyn ToolHandler>> {
        let handlers = self
            .assistants
            .get(assistant)
            .ok_or_else(|| ToolError::UnknownAssistant(assistant.to_string()))?;
        let tool: ToolName = name.parse()?;
        handlers
            .iter()
            .find(|h| h.name() == tool)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    /// Run one function call and build its correlated response.
    ///
    /// Never fails: lookup and execution errors become an `{"error": ...}` result.
    pub async fn dispatch(&self, assistant: &str, call: &FunctionCall) -> FunctionResponse {
        let outcome = match self.lookup(assistant, &call.name) {
            Ok(handler) => handler.call(&call.args).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => FunctionResponse::success(call, value),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, "Tool call failed: {}", e);
                FunctionResponse::failure(call, e.to_string())
            }
        }
    }
}
