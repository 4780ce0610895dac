//! Request authentication policy.
//!
//! # Responsibilities
//! - Pick the session for a request (connection certificate, then token)
//! - Decide which requests may run without a session
//!
//! # Design Decisions
//! - A transport session wins over any token header
//! - The anonymous allowlist is fixed: service discovery, login and CORS preflight

use std::sync::Arc;

use axum::http::{HeaderMap, Method};

use crate::auth::mtls::ConnectionIdentity;
use crate::auth::session::{Session, SessionLookup};

/// Header carrying a session token.
pub const X_AUTH_TOKEN: &str = "x-auth-token";

/// Requests that may be served without a session.
pub fn is_on_allowlist(path: &str, method: &Method) -> bool {
    if method == Method::OPTIONS {
        return true;
    }
    if method == Method::GET {
        return matches!(
            path,
            "/redfish" | "/redfish/" | "/redfish/v1" | "/redfish/v1/" | "/redfish/v1/odata" | "/redfish/v1/odata/"
        );
    }
    if method == Method::POST {
        return matches!(
            path,
            "/redfish/v1/SessionService/Sessions" | "/redfish/v1/SessionService/Sessions/"
        );
    }
    false
}

/// Find the session for a request.
pub fn authenticate(
    identity: Option<&ConnectionIdentity>,
    headers: &HeaderMap,
    sessions: &dyn SessionLookup,
) -> Option<Arc<Session>> {
    if let Some(session) = identity.and_then(ConnectionIdentity::session) {
        return Some(session);
    }

    let token = headers.get(X_AUTH_TOKEN)?.to_str().ok()?;
    let session = sessions.lookup_token(token);
    if session.is_none() {
        tracing::debug!("Unknown or expired session token");
    }
    session
}
