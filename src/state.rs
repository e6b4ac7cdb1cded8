//! Shared application state.
//!
//! Built once at startup from [`ServerConfig`] and shared by every handler
//! behind an `Arc`. Holds the Live API connector, the tool registry, the
//! per-session conversation template and the websocket connection counters.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ConfigError, ServerConfig};
use crate::core::live::{ConversationConfig, GeminiLiveConnector, LiveConnector, LiveError};
use crate::core::relay::RelaySettings;
use crate::core::tools::{DiagnosticsClient, ToolError, ToolRegistry};

/// Errors raised while building [`AppState`].
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build tool registry: {0}")]
    Tools(#[from] ToolError),

    #[error("Failed to build Live API connector: {0}")]
    Live(#[from] LiveError),
}

/// Why a websocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

pub struct AppState {
    pub config: ServerConfig,
    /// Absent when no Live API key is configured; sessions then fail fast.
    connector: Option<Arc<dyn LiveConnector>>,
    pub registry: Arc<ToolRegistry>,
    pub conversation: Arc<ConversationConfig>,
    pub relay_settings: RelaySettings,

    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
    sessions: DashMap<Uuid, CancellationToken>,
}

impl AppState {
    /// Build state with the Gemini connector described by `config`.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let connector: Option<Arc<dyn LiveConnector>> = if config.has_google_api_key() {
            Some(Arc::new(GeminiLiveConnector::new(config.live_settings())?))
        } else {
            tracing::warn!("GOOGLE_API_KEY is not set, live sessions will be refused");
            None
        };
        Self::with_connector(config, connector)
    }

    /// Build state around a caller-supplied connector.
    pub fn with_connector(
        config: ServerConfig,
        connector: Option<Arc<dyn LiveConnector>>,
    ) -> Result<Arc<Self>, StateError> {
        let profile = config.assistant_profile()?;
        let tools = config.enabled_tools()?;

        let client = DiagnosticsClient::new(config.diagnostics_api_url.clone())?;
        let mut registry = ToolRegistry::new();
        registry.register_tools(profile.name, &tools, &client);

        let conversation = profile.conversation_config(&registry, &config.session_options());
        tracing::info!(
            assistant = profile.name,
            model = %conversation.model,
            tools = conversation.tools.len(),
            "Assistant configured"
        );

        Ok(Arc::new(Self {
            relay_settings: config.relay_settings(),
            config,
            connector,
            registry: Arc::new(registry),
            conversation: Arc::new(conversation),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
            sessions: DashMap::new(),
        }))
    }

    pub fn connector(&self) -> Option<Arc<dyn LiveConnector>> {
        self.connector.clone()
    }

    // =========================================================================
    // Connection limits
    // =========================================================================

    /// Reserve a websocket slot for `ip`, honouring global and per-IP limits.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let previous = self.ws_connections.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = self.config.max_websocket_connections
            && previous >= max
        {
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        let accepted = {
            let mut count = self.ip_connections.entry(ip).or_insert(0);
            if *count >= self.config.max_connections_per_ip {
                false
            } else {
                *count += 1;
                true
            }
        };

        if !accepted {
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        Ok(())
    }

    /// Release a slot taken by [`Self::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        if let Some(mut count) = self.ip_connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
        }
        self.ip_connections.remove_if(&ip, |_, count| *count == 0);
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }

    // =========================================================================
    // Active sessions
    // =========================================================================

    pub fn register_session(&self, id: Uuid, cancel: CancellationToken) {
        self.sessions.insert(id, cancel);
    }

    pub fn unregister_session(&self, id: &Uuid) {
        self.sessions.remove(id);
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel every running session, e.g. on shutdown.
    pub fn cancel_all_sessions(&self) {
        for entry in self.sessions.iter() {
            entry.value().cancel();
        }
    }
}
