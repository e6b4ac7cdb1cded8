//! Cross-field checks run after merging.

use url::Url;

use super::{ConfigError, ServerConfig};

pub(crate) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_tls(config)?;
    validate_urls(config)?;
    validate_assistant(config)?;
    validate_compression(config)?;
    validate_rate_limit(config)?;
    Ok(())
}

fn validate_tls(config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(tls) = &config.tls {
        if tls.cert_path.is_empty() {
            return Err(ConfigError::invalid(
                "tls.cert_path",
                "required when TLS is enabled",
            ));
        }
        if tls.key_path.is_empty() {
            return Err(ConfigError::invalid(
                "tls.key_path",
                "required when TLS is enabled",
            ));
        }
    }
    Ok(())
}

fn validate_urls(config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &config.live_endpoint {
        check_scheme("live.endpoint", endpoint, &["ws", "wss"])?;
    }
    check_scheme(
        "assistant.diagnostics_api_url",
        &config.diagnostics_api_url,
        &["http", "https"],
    )
}

fn check_scheme(key: &str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigError::invalid(key, format!("{raw:?}: {e}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::invalid(
            key,
            format!("expected a {} URL, got {raw:?}", schemes.join("/")),
        ));
    }
    Ok(())
}

/// The assistant must exist and may only enable tools its profile lists.
fn validate_assistant(config: &ServerConfig) -> Result<(), ConfigError> {
    let profile = config.assistant_profile()?;
    if let Some(tools) = &config.assistant_tools {
        if let Some(extra) = tools.iter().find(|t| !profile.tools.contains(t)) {
            return Err(ConfigError::invalid(
                "assistant.tools",
                format!("{} is not offered by {}", extra, profile.name),
            ));
        }
    }
    Ok(())
}

fn validate_compression(config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(c) = &config.live_context_window_compression {
        if c.target_tokens > c.trigger_tokens {
            return Err(ConfigError::invalid(
                "live.context_window_compression",
                format!(
                    "target_tokens ({}) exceeds trigger_tokens ({})",
                    c.target_tokens, c.trigger_tokens
                ),
            ));
        }
    }
    Ok(())
}

fn validate_rate_limit(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.rate_limit_burst_size == 0 {
        return Err(ConfigError::invalid(
            "security.rate_limit_burst_size",
            "must be at least 1",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_scheme() {
        assert!(check_scheme("k", "wss://example.com/ws", &["ws", "wss"]).is_ok());
        assert!(check_scheme("k", "http://example.com", &["ws", "wss"]).is_err());
        assert!(check_scheme("k", "not a url", &["http"]).is_err());
    }
}
