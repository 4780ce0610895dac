//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request (method, path)
//!     → router.rs (walk the table in registration order)
//!     → matcher.rs (literal and `{param}` segments)
//!     → handler, or 404 / 405 with Allow / OPTIONS answered in place
//! ```
//!
//! # Design Decisions
//! - Table built once at startup, immutable at runtime
//! - No regex in the hot path
//! - First match wins

pub mod matcher;
pub mod router;

pub use matcher::PathPattern;
pub use router::{Handler, Router};
