//! Outbound HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! Handler continuation
//!     → HttpClient::send(OutboundRequest)
//!     → destination slot (semaphore, counters)
//!     → reqwest connection pool → satellite / subscriber
//!     → OutboundResponse or ClientError back to the continuation
//! ```
//!
//! # Design Decisions
//! - Built once at startup and handed to every component that calls out
//! - Cheap to clone; clones share the pool and the destination table
//! - Failures are values: the caller decides to retry, degrade or report

pub mod error;
pub mod http_client;
pub mod request;

pub use error::ClientError;
pub use http_client::{DestinationStats, HttpClient};
pub use request::{OutboundRequest, OutboundResponse};
