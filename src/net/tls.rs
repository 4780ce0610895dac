//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load the server certificate chain and private key (PEM)
//! - Build the rustls server config, optionally verifying client certificates
//!
//! # Design Decisions
//! - Explicit `ring` crypto provider, no process-wide default needed
//! - With a client CA configured the certificate is requested but optional;
//!   requests without one fall back to token authentication
//! - ALPN offers HTTP/2 and HTTP/1.1

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use thiserror::Error;

use crate::config::TlsConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("invalid client CA certificate: {0}")]
    ClientCa(#[source] rustls::Error),

    #[error("cannot build client certificate verifier: {0}")]
    Verifier(String),

    #[error("tls configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path).map(BufReader::new).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Every certificate in a PEM file, in file order.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

/// First private key (PKCS#8, PKCS#1 or SEC1) in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

/// Build the rustls server configuration.
pub fn server_config(config: &TlsConfig) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let certs = load_certs(Path::new(&config.cert_path))?;
    let key = load_private_key(Path::new(&config.key_path))?;

    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let builder = match &config.client_ca_path {
        Some(ca_path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(Path::new(ca_path))? {
                roots.add(cert).map_err(TlsError::ClientCa)?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .allow_unauthenticated()
                .build()
                .map_err(|e| TlsError::Verifier(e.to_string()))?;
            tracing::info!(client_ca = %ca_path, "Client certificate verification enabled");
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut server_config = builder.with_single_cert(certs, key)?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(server_config))
}

/// Server configuration wrapped for `axum-server`.
pub fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    Ok(RustlsConfig::from_config(server_config(config)?))
}


#[cfg(test)]
mod tests {
    use super::testing::write_temp;
    use super::*;
    use rcgen::{CertificateParams, KeyPair};

    fn self_signed() -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        (cert.pem(), key.serialize_pem())
    }

    fn tls_config(client_ca: Option<&str>) -> TlsConfig {
        let (cert, key) = self_signed();
        TlsConfig {
            cert_path: write_temp("cert.pem", &cert).display().to_string(),
            key_path: write_temp("key.pem", &key).display().to_string(),
            client_ca_path: client_ca.map(|pem| write_temp("ca.pem", pem).display().to_string()),
        }
    }

    #[test]
    fn builds_server_config() {
        let config = server_config(&tls_config(None)).unwrap();
        assert_eq!(config.alpn_protocols[0], b"h2");
    }

    #[test]
    fn builds_config_with_client_ca() {
        let (ca, _) = self_signed();
        assert!(server_config(&tls_config(Some(&ca))).is_ok());
    }

    #[test]
    fn missing_files_and_empty_pem() {
        let err = load_certs(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));

        let empty = write_temp("empty.pem", "");
        assert!(matches!(load_certs(&empty), Err(TlsError::NoCertificates(_))));
        assert!(matches!(load_private_key(&empty), Err(TlsError::NoPrivateKey(_))));
    }
}
