//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared by value/Arc with all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AggregationConfig, AuthConfig, CertParseMode, ClientConfig, CorsConfig, EventLoopConfig, ListenerConfig,
    LogFormat, MtlsConfig, ObservabilityConfig, RetryConfig, SatelliteConfig, SecurityConfig, ServerConfig,
    TimeoutConfig, TlsConfig, UpnMatchPolicy,
};
