//! Mutual TLS connection authentication.
//!
//! Runs once per accepted connection, after rustls has verified the client
//! chain against the configured trust store. The outcome is attached to
//! every request on that connection.

use std::net::IpAddr;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;

use crate::auth::identity::{resolve_identity, IdentityError, IdentityPolicy};
use crate::auth::session::{Session, SessionType};
use crate::config::MtlsConfig;
use crate::observability::metrics;

/// Authentication state of one connection.
#[derive(Debug, Clone)]
pub enum ConnectionIdentity {
    /// No client certificate, or certificate authentication disabled.
    Anonymous,
    /// Certificate mapped to a local user.
    Authenticated(Arc<Session>),
    /// Certificate presented but not accepted.
    Rejected(IdentityError),
}

impl ConnectionIdentity {
    pub fn session(&self) -> Option<Arc<Session>> {
        match self {
            ConnectionIdentity::Authenticated(session) => Some(session.clone()),
            _ => None,
        }
    }
}

/// Maps verified peer certificates to sessions.
#[derive(Debug, Clone)]
pub struct MtlsAuthenticator {
    enabled: bool,
    policy: IdentityPolicy,
}

impl MtlsAuthenticator {
    pub fn new(config: &MtlsConfig) -> Self {
        Self {
            enabled: config.enabled,
            policy: IdentityPolicy::from(config),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve the end-entity certificate of a verified chain.
    pub fn authenticate(
        &self,
        peer_certs: Option<&[CertificateDer<'_>]>,
        client_ip: Option<IpAddr>,
    ) -> ConnectionIdentity {
        if !self.enabled {
            return ConnectionIdentity::Anonymous;
        }
        let Some(leaf) = peer_certs.and_then(|certs| certs.first()) else {
            tracing::debug!("No client certificate presented");
            return ConnectionIdentity::Anonymous;
        };

        match resolve_identity(leaf.as_ref(), &self.policy) {
            Ok(username) => {
                let session = Arc::new(Session::new(username, client_ip, SessionType::MutualTls));
                tracing::info!(
                    outcome = "authenticated",
                    username = %session.username,
                    session_id = %session.id,
                    client_ip = ?client_ip,
                    "Client certificate accepted"
                );
                metrics::record_mtls_auth("authenticated");
                ConnectionIdentity::Authenticated(session)
            }
            Err(error) => {
                tracing::warn!(
                    outcome = error.outcome(),
                    error = %error,
                    client_ip = ?client_ip,
                    "Client certificate rejected"
                );
                metrics::record_mtls_auth(error.outcome());
                ConnectionIdentity::Rejected(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CertParseMode;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn cert_with_cn(cn: &str) -> CertificateDer<'static> {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, cn);
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    fn enabled_config() -> MtlsConfig {
        MtlsConfig {
            enabled: true,
            parse_mode: CertParseMode::CommonName,
            ..MtlsConfig::default()
        }
    }

    #[test]
    fn disabled_is_anonymous() {
        let auth = MtlsAuthenticator::new(&MtlsConfig::default());
        let certs = [cert_with_cn("alice")];
        assert!(matches!(auth.authenticate(Some(&certs), None), ConnectionIdentity::Anonymous));
    }

    #[test]
    fn missing_certificate_is_anonymous() {
        let auth = MtlsAuthenticator::new(&enabled_config());
        assert!(matches!(auth.authenticate(None, None), ConnectionIdentity::Anonymous));
        assert!(matches!(auth.authenticate(Some(&[]), None), ConnectionIdentity::Anonymous));
    }

    #[test]
    fn leaf_certificate_creates_session() {
        let auth = MtlsAuthenticator::new(&enabled_config());
        let certs = [cert_with_cn("alice"), cert_with_cn("intermediate")];
        let identity = auth.authenticate(Some(&certs), "192.0.2.7".parse().ok());

        let session = identity.session().unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.session_type, SessionType::MutualTls);
        assert_eq!(session.client_ip, "192.0.2.7".parse().ok());
    }

    #[test]
    fn garbage_certificate_is_rejected() {
        let auth = MtlsAuthenticator::new(&enabled_config());
        let certs = [CertificateDer::from(vec![0u8; 4])];
        match auth.authenticate(Some(&certs), None) {
            ConnectionIdentity::Rejected(err) => assert!(err.is_decode_error()),
            other => panic!("unexpected identity {other:?}"),
        }
    }
}
