//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! TLS handshake (client certificate verified by rustls)
//!     → mtls.rs (once per connection)
//!     → identity.rs (extract principal, match against hostname)
//!     → session.rs (connection-owned Session)
//!
//! Each request:
//!     → policy.rs (connection session, else X-Auth-Token lookup)
//!     → allowlist check for anonymous requests
//! ```
//!
//! # Design Decisions
//! - Decode failures and policy denials are distinct outcomes in the audit log
//! - No role model; a session only carries who the caller is

pub mod identity;
pub mod mtls;
pub mod policy;
pub mod session;

pub use identity::{identity_matches, resolve_identity, IdentityError, IdentityPolicy};
pub use mtls::{ConnectionIdentity, MtlsAuthenticator};
pub use session::{Session, SessionLookup, SessionStore, SessionType};
