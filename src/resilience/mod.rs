//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound attempt fails or returns 502/503/504:
//!     → retries.rs (is the attempt retryable?)
//!     → backoff.rs (how long to wait before the next one)
//! ```
//!
//! # Design Decisions
//! - Every outbound call has a deadline (client connect + request timeouts)
//! - Retries only for idempotent requests (GET, HEAD, PUT, DELETE, ...)
//! - Jittered backoff prevents synchronized retry bursts

pub mod backoff;
pub mod retries;

pub use backoff::{calculate_backoff, retry_delay};
pub use retries::is_retryable;
