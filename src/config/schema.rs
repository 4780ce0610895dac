//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the management web server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Optional TLS configuration. Plain HTTP when absent.
    pub tls: Option<TlsConfig>,

    /// Authentication settings (sessions, mutual TLS).
    pub auth: AuthConfig,

    /// Handler event loop pool.
    pub event_loops: EventLoopConfig,

    /// Outbound HTTP client.
    pub client: ClientConfig,

    /// Satellite management controllers whose collections are merged in.
    pub aggregation: AggregationConfig,

    /// CORS headers attached to every response.
    pub cors: CorsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:443").
    pub bind_address: String,

    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:443".to_string(),
            max_body_bytes: 30 * 1024 * 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Trust store used to verify client certificates (PEM).
    /// Client certificates are only requested when this is set.
    #[serde(default)]
    pub client_ca_path: Option<String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Reject requests without a session unless they are on the anonymous allowlist.
    pub enabled: bool,

    /// Idle timeout for token sessions in seconds.
    pub session_timeout_secs: u64,

    /// Client certificate authentication.
    pub mtls: MtlsConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_timeout_secs: 3600,
            mtls: MtlsConfig::default(),
        }
    }
}

/// Which certificate field carries the user name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertParseMode {
    /// Subject Common Name is the user name.
    CommonName,
    /// SAN otherName User Principal Name, `user@domain`.
    UserPrincipalName,
}

/// How the UPN domain is compared with the expected hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpnMatchPolicy {
    /// Whole-string equality, DNS case-insensitive.
    #[default]
    Exact,
    /// UPN domain must equal the trailing labels of the hostname.
    DomainSuffix,
}

/// Mutual TLS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MtlsConfig {
    /// Create sessions from verified client certificates.
    pub enabled: bool,

    /// Certificate field used for the identity.
    pub parse_mode: CertParseMode,

    /// Expected hostname for UPN matching.
    pub hostname: Option<String>,

    /// UPN domain matching policy.
    pub upn_match: UpnMatchPolicy,

    /// Require digitalSignature / clientAuth usages when those extensions are present.
    pub require_client_auth_usage: bool,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            parse_mode: CertParseMode::CommonName,
            hostname: None,
            upn_match: UpnMatchPolicy::Exact,
            require_client_auth_usage: true,
        }
    }
}

/// Handler event loop pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Number of single-threaded loops running handlers.
    pub workers: usize,
    /// Requests queued per loop before new ones are answered 503.
    pub queue_depth: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self { workers: 2, queue_depth: 1024 }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Idle connections kept per destination.
    pub pool_max_idle_per_host: usize,

    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time for one attempt in seconds.
    pub request_timeout_secs: u64,

    /// Concurrent requests per destination; excess requests queue.
    pub max_connections_per_destination: usize,

    /// Additional trust anchor for outbound TLS (PEM).
    pub ca_cert_path: Option<String>,

    /// Retry policy for idempotent requests.
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 20,
            pool_idle_timeout_secs: 90,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            max_connections_per_destination: 20,
            ca_cert_path: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Aggregation of satellite controllers.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AggregationConfig {
    pub satellites: Vec<SatelliteConfig>,
}

/// One satellite: its members are exposed as `<prefix>_<id>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SatelliteConfig {
    pub prefix: String,
    /// Base URL, e.g. "https://10.0.0.2".
    pub url: String,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// CORS response headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            allow_headers: "Content-Type, X-Auth-Token, If-None-Match".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
        }
    }
}
