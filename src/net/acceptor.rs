//! Connection acceptors for `axum-server`.
//!
//! # Responsibilities
//! - Complete the TLS handshake (TLS listeners)
//! - Resolve the peer certificate to an identity once per connection
//! - Attach a `ConnectionInfo` extension to every request of the connection
//!
//! # Design Decisions
//! - Certificate work happens at accept time, never per request
//! - A rejected certificate does not drop the connection; the request may
//!   still authenticate by token or hit the anonymous allowlist

use std::io;
use std::sync::Arc;

use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tower_http::add_extension::AddExtension;

use super::connection::{ConnectionInfo, ConnectionTracker};
use crate::auth::{ConnectionIdentity, MtlsAuthenticator};

/// Plain TCP acceptor.
#[derive(Debug, Clone)]
pub struct PlainAcceptor {
    tracker: ConnectionTracker,
}

impl PlainAcceptor {
    pub fn new(tracker: ConnectionTracker) -> Self {
        Self { tracker }
    }
}

impl<S> Accept<TcpStream, S> for PlainAcceptor
where
    S: Send + 'static,
{
    type Stream = TcpStream;
    type Service = AddExtension<S, ConnectionInfo>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: TcpStream, service: S) -> Self::Future {
        let info = ConnectionInfo::new(
            self.tracker.track(),
            stream.peer_addr().ok(),
            ConnectionIdentity::Anonymous,
        );
        tracing::debug!(connection_id = %info.id(), peer = ?info.peer_addr(), "Connection accepted");
        Box::pin(async move { Ok((stream, AddExtension::new(service, info))) })
    }
}

/// TLS acceptor resolving client certificates.
#[derive(Clone)]
pub struct MtlsAcceptor {
    inner: RustlsAcceptor,
    authenticator: Arc<MtlsAuthenticator>,
    tracker: ConnectionTracker,
}

impl MtlsAcceptor {
    pub fn new(config: RustlsConfig, authenticator: Arc<MtlsAuthenticator>, tracker: ConnectionTracker) -> Self {
        Self {
            inner: RustlsAcceptor::new(config),
            authenticator,
            tracker,
        }
    }
}

impl<S> Accept<TcpStream, S> for MtlsAcceptor
where
    S: Send + 'static,
{
    type Stream = TlsStream<TcpStream>;
    type Service = AddExtension<S, ConnectionInfo>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: TcpStream, service: S) -> Self::Future {
        let peer_addr = stream.peer_addr().ok();
        let handshake = self.inner.accept(stream, service);
        let authenticator = Arc::clone(&self.authenticator);
        let tracker = self.tracker.clone();

        Box::pin(async move {
            let (stream, service) = handshake.await.inspect_err(|e| {
                tracing::debug!(peer = ?peer_addr, error = %e, "TLS handshake failed");
            })?;

            let (_, connection) = stream.get_ref();
            let identity = authenticator.authenticate(
                connection.peer_certificates(),
                peer_addr.map(|addr| addr.ip()),
            );
            let info = ConnectionInfo::new(tracker.track(), peer_addr, identity);
            tracing::debug!(
                connection_id = %info.id(),
                peer = ?peer_addr,
                authenticated = info.session().is_some(),
                "TLS connection accepted"
            );
            Ok((stream, AddExtension::new(service, info)))
        })
    }
}
