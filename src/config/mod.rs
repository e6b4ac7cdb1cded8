//! Configuration module for the Vaani gateway server
//!
//! Configuration can be loaded from multiple sources with the following priority:
//! 1. YAML configuration file (if provided)
//! 2. Environment variables
//! 3. `.env` file (loaded into the environment by `main`)
//! 4. Default values
//!
//! # Example
//! ```rust,no_run
//! use vaani_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallback
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::live::{
    ContextWindowCompression, GeminiLiveSettings, InterruptionPolicy, ResponseModality,
    TurnCoverage,
};
use crate::core::relay::RelaySettings;
use crate::core::tools::{AssistantProfile, SessionOptions, ToolName};

pub use yaml::YamlConfig;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown assistant: {0}")]
    UnknownAssistant(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// TLS configuration for HTTPS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the certificate file (PEM format)
    pub cert_path: String,
    /// Path to the private key file (PEM format)
    pub key_path: String,
}

/// Server configuration
///
/// Note: Clone is derived for convenience, but be aware that cloning creates
/// copies of the API key in memory. The Drop implementation zeroizes it when
/// each instance is dropped. `Debug` output never includes the key.
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// TLS configuration (optional, enables HTTPS when set)
    pub tls: Option<TlsConfig>,

    /// Live API credential
    pub google_api_key: Option<String>,
    pub live_model: String,
    pub live_api_version: String,
    /// Websocket base URL override (tests point this at a local server)
    pub live_endpoint: Option<String>,
    pub live_voice: String,
    pub live_response_modality: ResponseModality,
    pub live_turn_coverage: Option<TurnCoverage>,
    pub live_context_window_compression: Option<ContextWindowCompression>,
    pub live_setup_timeout_seconds: u64,

    /// Assistant profile served by every session
    pub assistant_name: String,
    /// Subset of the profile's tools; all of them when unset
    pub assistant_tools: Option<Vec<ToolName>>,
    pub diagnostics_api_url: String,

    pub upstream_queue_capacity: usize,
    pub flush_on_turn_complete: bool,
    /// Per-read deadline on the remote stream, none when unset
    pub remote_read_timeout_seconds: Option<u64>,
    /// Per-write deadline on the remote stream, none when unset
    pub remote_write_timeout_seconds: Option<u64>,

    // Security settings
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Rate limit: requests per second per IP
    pub rate_limit_requests_per_second: u32,
    /// Rate limit: burst size
    pub rate_limit_burst_size: u32,
    /// Maximum concurrent WebSocket connections (None = unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: u32,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field(
                "google_api_key",
                &self.google_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("live_model", &self.live_model)
            .field("live_api_version", &self.live_api_version)
            .field("live_endpoint", &self.live_endpoint)
            .field("live_voice", &self.live_voice)
            .field("live_response_modality", &self.live_response_modality)
            .field("live_turn_coverage", &self.live_turn_coverage)
            .field(
                "live_context_window_compression",
                &self.live_context_window_compression,
            )
            .field("live_setup_timeout_seconds", &self.live_setup_timeout_seconds)
            .field("assistant_name", &self.assistant_name)
            .field("assistant_tools", &self.assistant_tools)
            .field("diagnostics_api_url", &self.diagnostics_api_url)
            .field("upstream_queue_capacity", &self.upstream_queue_capacity)
            .field("flush_on_turn_complete", &self.flush_on_turn_complete)
            .field("remote_read_timeout_seconds", &self.remote_read_timeout_seconds)
            .field("remote_write_timeout_seconds", &self.remote_write_timeout_seconds)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field(
                "rate_limit_requests_per_second",
                &self.rate_limit_requests_per_second,
            )
            .field("rate_limit_burst_size", &self.rate_limit_burst_size)
            .field("max_websocket_connections", &self.max_websocket_connections)
            .field("max_connections_per_ip", &self.max_connections_per_ip)
            .finish()
    }
}

impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.google_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error when a variable has an invalid format or names an
    /// unknown assistant or tool.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables as the base
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or parsed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        // Priority: YAML > environment (.env + actual ENV) > defaults
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn has_google_api_key(&self) -> bool {
        self.google_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// The configured assistant profile.
    pub fn assistant_profile(&self) -> Result<&'static AssistantProfile, ConfigError> {
        AssistantProfile::by_name(&self.assistant_name)
            .map_err(|_| ConfigError::UnknownAssistant(self.assistant_name.clone()))
    }

    /// Tools enabled for the configured assistant.
    pub fn enabled_tools(&self) -> Result<Vec<ToolName>, ConfigError> {
        match &self.assistant_tools {
            Some(tools) => Ok(tools.clone()),
            None => Ok(self.assistant_profile()?.tools.to_vec()),
        }
    }

    /// Connection settings for the Gemini Live connector.
    pub fn live_settings(&self) -> GeminiLiveSettings {
        let defaults = GeminiLiveSettings::default();
        GeminiLiveSettings {
            api_key: self.google_api_key.clone().unwrap_or_default().into(),
            api_version: self.live_api_version.clone(),
            base_url: self
                .live_endpoint
                .clone()
                .unwrap_or_else(|| defaults.base_url.clone()),
            setup_timeout: Duration::from_secs(self.live_setup_timeout_seconds),
            read_timeout: self.remote_read_timeout_seconds.map(Duration::from_secs),
            write_timeout: self.remote_write_timeout_seconds.map(Duration::from_secs),
        }
    }

    /// Session knobs applied on top of the assistant profile.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.live_model.clone(),
            voice: Some(self.live_voice.clone()),
            response_modality: self.live_response_modality,
            turn_coverage: self.live_turn_coverage,
            context_window_compression: self.live_context_window_compression,
            interruption: InterruptionPolicy {
                flush_on_turn_complete: self.flush_on_turn_complete,
            },
        }
    }

    /// Relay settings for each session.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            assistant: self.assistant_name.clone(),
            upstream_capacity: self.upstream_queue_capacity,
            ..Default::default()
        }
    }
}
