//! Layer YAML values over the environment-derived configuration.

use super::env::{load_from_env, parse_modality, parse_tools, parse_turn_coverage};
use super::yaml::YamlConfig;
use super::{ConfigError, ServerConfig, TlsConfig};
use crate::core::live::ContextWindowCompression;

/// Environment first, then every value present in the YAML file.
pub(crate) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let mut config = load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                Some(true) => {
                    let current = config.tls.take();
                    config.tls = Some(TlsConfig {
                        cert_path: tls
                            .cert_path
                            .or_else(|| current.as_ref().map(|t| t.cert_path.clone()))
                            .unwrap_or_default(),
                        key_path: tls
                            .key_path
                            .or_else(|| current.as_ref().map(|t| t.key_path.clone()))
                            .unwrap_or_default(),
                    });
                }
                None => {
                    if let Some(existing) = config.tls.as_mut() {
                        if let Some(cert_path) = tls.cert_path {
                            existing.cert_path = cert_path;
                        }
                        if let Some(key_path) = tls.key_path {
                            existing.key_path = key_path;
                        }
                    }
                }
            }
        }
    }

    if let Some(live) = yaml.live {
        if let Some(api_key) = live.api_key {
            config.google_api_key = Some(api_key);
        }
        if let Some(model) = live.model {
            config.live_model = model;
        }
        if let Some(api_version) = live.api_version {
            config.live_api_version = api_version;
        }
        if let Some(endpoint) = live.endpoint {
            config.live_endpoint = Some(endpoint);
        }
        if let Some(voice) = live.voice {
            config.live_voice = voice;
        }
        if let Some(modality) = live.response_modality {
            config.live_response_modality = parse_modality("live.response_modality", &modality)?;
        }
        if let Some(coverage) = live.turn_coverage {
            config.live_turn_coverage =
                Some(parse_turn_coverage("live.turn_coverage", &coverage)?);
        }
        if let Some(compression) = live.context_window_compression {
            config.live_context_window_compression = Some(ContextWindowCompression {
                trigger_tokens: compression.trigger_tokens,
                target_tokens: compression.target_tokens,
            });
        }
        if let Some(secs) = live.setup_timeout_seconds {
            config.live_setup_timeout_seconds = secs;
        }
    }

    if let Some(assistant) = yaml.assistant {
        if let Some(name) = assistant.name {
            config.assistant_name = name;
        }
        if let Some(tools) = assistant.tools {
            config.assistant_tools = Some(parse_tools(tools.iter().map(String::as_str))?);
        }
        if let Some(url) = assistant.diagnostics_api_url {
            config.diagnostics_api_url = url;
        }
    }

    if let Some(relay) = yaml.relay {
        if let Some(capacity) = relay.upstream_queue_capacity {
            config.upstream_queue_capacity = capacity;
        }
        if let Some(flush) = relay.flush_on_turn_complete {
            config.flush_on_turn_complete = flush;
        }
        if let Some(secs) = relay.remote_read_timeout_seconds {
            config.remote_read_timeout_seconds = Some(secs);
        }
        if let Some(secs) = relay.remote_write_timeout_seconds {
            config.remote_write_timeout_seconds = Some(secs);
        }
    }

    if let Some(security) = yaml.security {
        if let Some(origins) = security.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if let Some(max) = security.max_websocket_connections {
            config.max_websocket_connections = Some(max);
        }
        if let Some(max) = security.max_connections_per_ip {
            config.max_connections_per_ip = max;
        }
    }

    Ok(config)
}
