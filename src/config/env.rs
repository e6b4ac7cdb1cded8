//! Environment variable loading.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use super::{ConfigError, ServerConfig, TlsConfig};
use crate::core::live::gemini::{
    DEFAULT_API_VERSION, DEFAULT_LIVE_MODEL, DEFAULT_SETUP_TIMEOUT, GeminiVoice,
};
use crate::core::live::{ContextWindowCompression, ResponseModality, TurnCoverage};
use crate::core::relay::DEFAULT_UPSTREAM_CAPACITY;
use crate::core::tools::{DEFAULT_DIAGNOSTICS_API_URL, ToolName, YODA_DIAGNOSTICS};

pub(crate) const DEFAULT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_PORT: u16 = 9082;
pub(crate) const DEFAULT_REMOTE_WRITE_TIMEOUT_SECS: u64 = 10;
pub(crate) const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub(crate) const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
pub(crate) const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

/// Non-empty value of an environment variable.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(name, format!("{raw:?}: {e}"))),
        None => Ok(None),
    }
}

/// Parse a boolean the way shells usually spell it.
pub(crate) fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("expected a boolean, got {other:?}"))),
    }
}

fn bool_var(name: &str) -> Result<Option<bool>, ConfigError> {
    var(name).map(|raw| parse_bool(name, &raw)).transpose()
}

pub(crate) fn parse_turn_coverage(key: &str, raw: &str) -> Result<TurnCoverage, ConfigError> {
    TurnCoverage::parse(raw.trim()).ok_or_else(|| {
        ConfigError::invalid(key, format!("expected all_input or only_activity, got {raw:?}"))
    })
}

pub(crate) fn parse_modality(key: &str, raw: &str) -> Result<ResponseModality, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "audio" | "text" => Ok(ResponseModality::from_str_or_default(raw.trim())),
        _ => Err(ConfigError::invalid(key, format!("expected audio or text, got {raw:?}"))),
    }
}

/// Parse tool names, rejecting any the gateway does not serve.
pub(crate) fn parse_tools<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<ToolName>, ConfigError> {
    names
        .into_iter()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| {
            n.parse::<ToolName>()
                .map_err(|_| ConfigError::UnknownTool(n.to_string()))
        })
        .collect()
}

/// Build a configuration from environment variables and defaults.
pub(crate) fn load_from_env() -> Result<ServerConfig, ConfigError> {
    let tls = if bool_var("TLS_ENABLED")?.unwrap_or(false) {
        Some(TlsConfig {
            cert_path: var("TLS_CERT_PATH").unwrap_or_default(),
            key_path: var("TLS_KEY_PATH").unwrap_or_default(),
        })
    } else {
        None
    };

    let live_turn_coverage = var("LIVE_TURN_COVERAGE")
        .map(|raw| parse_turn_coverage("LIVE_TURN_COVERAGE", &raw))
        .transpose()?;

    let live_response_modality = var("LIVE_RESPONSE_MODALITY")
        .map(|raw| parse_modality("LIVE_RESPONSE_MODALITY", &raw))
        .transpose()?
        .unwrap_or_default();

    let trigger = parse_var::<u64>("LIVE_COMPRESSION_TRIGGER_TOKENS")?;
    let target = parse_var::<u64>("LIVE_COMPRESSION_TARGET_TOKENS")?;
    let live_context_window_compression = match (trigger, target) {
        (Some(trigger_tokens), Some(target_tokens)) => Some(ContextWindowCompression {
            trigger_tokens,
            target_tokens,
        }),
        (None, None) => None,
        _ => {
            return Err(ConfigError::invalid(
                "LIVE_COMPRESSION_TRIGGER_TOKENS",
                "trigger and target tokens must be set together",
            ));
        }
    };

    let assistant_tools = var("ASSISTANT_TOOLS")
        .map(|raw| parse_tools(raw.split(',')))
        .transpose()?;

    Ok(ServerConfig {
        host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: parse_var("PORT")?.unwrap_or(DEFAULT_PORT),
        tls,
        google_api_key: var("GOOGLE_API_KEY"),
        live_model: var("LIVE_MODEL").unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
        live_api_version: var("LIVE_API_VERSION")
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        live_endpoint: var("LIVE_ENDPOINT"),
        live_voice: var("LIVE_VOICE").unwrap_or_else(|| GeminiVoice::default().to_string()),
        live_response_modality,
        live_turn_coverage,
        live_context_window_compression,
        live_setup_timeout_seconds: parse_var("LIVE_SETUP_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_SETUP_TIMEOUT.as_secs()),
        assistant_name: var("ASSISTANT_NAME").unwrap_or_else(|| YODA_DIAGNOSTICS.name.to_string()),
        assistant_tools,
        diagnostics_api_url: var("DIAGNOSTICS_API_URL")
            .unwrap_or_else(|| DEFAULT_DIAGNOSTICS_API_URL.to_string()),
        upstream_queue_capacity: parse_var("UPSTREAM_QUEUE_CAPACITY")?
            .unwrap_or(DEFAULT_UPSTREAM_CAPACITY),
        flush_on_turn_complete: bool_var("FLUSH_ON_TURN_COMPLETE")?.unwrap_or(true),
        remote_read_timeout_seconds: parse_var("REMOTE_READ_TIMEOUT_SECS")?,
        remote_write_timeout_seconds: Some(
            parse_var("REMOTE_WRITE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REMOTE_WRITE_TIMEOUT_SECS),
        ),
        cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
        rate_limit_requests_per_second: parse_var("RATE_LIMIT_REQUESTS_PER_SECOND")?
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
        rate_limit_burst_size: parse_var("RATE_LIMIT_BURST_SIZE")?
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
        max_websocket_connections: parse_var("MAX_WEBSOCKET_CONNECTIONS")?,
        max_connections_per_ip: parse_var("MAX_CONNECTIONS_PER_IP")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_IP),
    })
}
