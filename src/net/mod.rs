//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (rustls server config, optional client CA)
//!     → acceptor.rs (handshake, certificate → identity, once per connection)
//!     → connection.rs (connection id, open-connection count)
//!     → Hand off to HTTP layer with ConnectionInfo attached
//! ```
//!
//! # Design Decisions
//! - Each connection tracked for graceful shutdown
//! - TLS is optional; plain listeners are for development and tests

pub mod acceptor;
pub mod connection;
pub mod tls;

pub use acceptor::{MtlsAcceptor, PlainAcceptor};
pub use connection::{ConnectionId, ConnectionInfo, ConnectionTracker};
pub use tls::{load_tls_config, TlsError};
