//! Standard response headers.
//!
//! # Responsibilities
//! - Attach the security header set to every response
//! - Attach the CORS headers to every response, preflight included
//!
//! # Design Decisions
//! - Applied as tower layers around the whole app, so handlers and the
//!   router's own 404/405/OPTIONS answers all carry them
//! - Security headers override anything a handler set; CORS headers only
//!   fill in what is missing

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CorsConfig, SecurityConfig};

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; img-src 'self' data:; font-src 'self'; \
     style-src 'self'; script-src 'self'; connect-src 'self' wss:; form-action 'none'; \
     frame-ancestors 'none'; object-src 'none'; base-uri 'none'";

/// Fixed security header set.
pub fn security_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubdomains; preload"),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-Store,no-Cache")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ),
    ]
}

/// CORS headers built from configuration. Values that are not valid header
/// values are skipped with a warning; validation normally rejects them first.
pub fn cors_headers(config: &CorsConfig) -> Vec<(HeaderName, HeaderValue)> {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, config.allow_origin.as_str()),
        (header::ACCESS_CONTROL_ALLOW_METHODS, config.allow_methods.as_str()),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, config.allow_headers.as_str()),
    ]
    .into_iter()
    .filter_map(|(name, value)| match HeaderValue::from_str(value) {
        Ok(value) => Some((name, value)),
        Err(_) => {
            tracing::warn!(header = %name, "Skipping invalid CORS header value");
            None
        }
    })
    .collect()
}

/// Wrap `app` with the configured response header layers.
pub fn apply<S>(mut app: Router<S>, security: &SecurityConfig, cors: &CorsConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if cors.enabled {
        for (name, value) in cors_headers(cors) {
            app = app.layer(SetResponseHeaderLayer::if_not_present(name, value));
        }
    }
    if security.enable_headers {
        for (name, value) in security_headers() {
            app = app.layer(SetResponseHeaderLayer::overriding(name, value));
        }
    }
    app
}
