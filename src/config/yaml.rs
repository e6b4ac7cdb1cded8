use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 9082
///   tls:
///     enabled: false
///
/// live:
///   api_key: "your-google-api-key"
///   model: "gemini-2.0-flash-live-001"
///   api_version: "v1alpha"
///   voice: "Puck"
///   response_modality: "audio"
///   turn_coverage: "all_input"
///   context_window_compression:
///     trigger_tokens: 25600
///     target_tokens: 12800
///
/// assistant:
///   name: "yoda_diagnostics"
///   tools: ["get_health_packages", "get_test_details", "book_appointment"]
///   diagnostics_api_url: "https://api.yodadiagnostics.com"
///
/// relay:
///   upstream_queue_capacity: 5
///   flush_on_turn_complete: true
///   remote_write_timeout_seconds: 10
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub live: Option<LiveYaml>,
    pub assistant: Option<AssistantYaml>,
    pub relay: Option<RelayYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Live API configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub api_version: Option<String>,
    /// Websocket base URL override
    pub endpoint: Option<String>,
    pub voice: Option<String>,
    /// "audio" or "text"
    pub response_modality: Option<String>,
    /// "all_input" or "only_activity"
    pub turn_coverage: Option<String>,
    pub context_window_compression: Option<CompressionYaml>,
    pub setup_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompressionYaml {
    pub trigger_tokens: u64,
    pub target_tokens: u64,
}

/// Assistant selection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AssistantYaml {
    pub name: Option<String>,
    /// Subset of the profile's tools to enable
    pub tools: Option<Vec<String>>,
    pub diagnostics_api_url: Option<String>,
}

/// Relay tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub upstream_queue_capacity: Option<usize>,
    pub flush_on_turn_complete: Option<bool>,
    pub remote_read_timeout_seconds: Option<u64>,
    pub remote_write_timeout_seconds: Option<u64>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(serde_yaml::from_str(&contents)?)
    }
}
