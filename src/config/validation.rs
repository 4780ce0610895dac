//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check cross-section requirements (mTLS needs a client trust store)
//! - Validate value ranges (timeouts > 0, workers > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;

use crate::config::schema::{CertParseMode, ServerConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if config.event_loops.workers == 0 {
        errors.push(ValidationError::new("event_loops.workers", "must be >= 1"));
    }
    if config.event_loops.queue_depth == 0 {
        errors.push(ValidationError::new("event_loops.queue_depth", "must be >= 1"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.client.request_timeout_secs == 0 || config.client.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("client", "timeouts must be > 0"));
    }
    if config.client.max_connections_per_destination == 0 {
        errors.push(ValidationError::new(
            "client.max_connections_per_destination",
            "must be >= 1",
        ));
    }
    if config.client.retry.max_attempts == 0 {
        errors.push(ValidationError::new("client.retry.max_attempts", "must be >= 1"));
    }

    let mtls = &config.auth.mtls;
    if mtls.enabled {
        let has_ca = config
            .tls
            .as_ref()
            .and_then(|tls| tls.client_ca_path.as_ref())
            .is_some();
        if !has_ca {
            errors.push(ValidationError::new(
                "auth.mtls.enabled",
                "requires tls.client_ca_path",
            ));
        }
        if mtls.parse_mode == CertParseMode::UserPrincipalName
            && mtls.hostname.as_deref().map_or(true, str::is_empty)
        {
            errors.push(ValidationError::new(
                "auth.mtls.hostname",
                "required for user_principal_name parsing",
            ));
        }
    }

    for satellite in &config.aggregation.satellites {
        if satellite.prefix.is_empty() || satellite.prefix.contains(['/', '_']) {
            errors.push(ValidationError::new(
                "aggregation.satellites.prefix",
                format!("'{}' must be non-empty without '/' or '_'", satellite.prefix),
            ));
        }
        if url::Url::parse(&satellite.url).is_err() {
            errors.push(ValidationError::new(
                "aggregation.satellites.url",
                format!("'{}' is not a URL", satellite.url),
            ));
        }
    }

    if config.cors.enabled {
        for (field, value) in [
            ("cors.allow_origin", &config.cors.allow_origin),
            ("cors.allow_methods", &config.cors.allow_methods),
            ("cors.allow_headers", &config.cors.allow_headers),
        ] {
            if HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::new(field, "not a valid header value"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "not-an-addr".into();
        config.timeouts.request_secs = 0;
        config.client.retry.max_attempts = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn rejects_empty_event_loop_queue() {
        let mut config = ServerConfig::default();
        config.event_loops.queue_depth = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "event_loops.queue_depth");
    }

    #[test]
    fn rejects_bad_satellites() {
        let mut config = ServerConfig::default();
        config.aggregation.satellites.push(crate::config::SatelliteConfig {
            prefix: "sat_1".into(),
            url: "not a url".into(),
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn mtls_requires_trust_store_and_hostname() {
        let mut config = ServerConfig::default();
        config.auth.mtls.enabled = true;
        config.auth.mtls.parse_mode = CertParseMode::UserPrincipalName;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"auth.mtls.enabled"));
        assert!(fields.contains(&"auth.mtls.hostname"));

        config.tls = Some(TlsConfig {
            cert_path: "cert.pem".into(),
            key_path: "key.pem".into(),
            client_ca_path: Some("ca.pem".into()),
        });
        config.auth.mtls.hostname = Some("bmc.example.com".into());
        assert!(validate_config(&config).is_ok());
    }
}
