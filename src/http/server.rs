//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Build the shared services and the event loop pool
//! - Wire up middleware (request ID, tracing, timeout, body limit, headers)
//! - Authenticate each request and hand it to an event loop
//! - Serve plain or TLS listeners with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request as AxumRequest, State},
    http::{header, StatusCode, Version},
    response::{IntoResponse, Response},
    Extension, Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::event_loop::{EventLoopPool, SubmitError};
use super::request::Request;
use super::{headers, response::error_body};
use crate::auth::policy::{authenticate, is_on_allowlist};
use crate::auth::{MtlsAuthenticator, SessionStore};
use crate::client::ClientError;
use crate::config::ServerConfig;
use crate::net::{load_tls_config, ConnectionInfo, ConnectionTracker, MtlsAcceptor, PlainAcceptor, TlsError};
use crate::observability::metrics;
use crate::redfish::{self, Services};
use crate::routing::Router as RouteTable;

/// How often idle token sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Grace period for open connections on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("tls setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("outbound client setup failed: {0}")]
    Client(#[from] ClientError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// State injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    loops: Arc<EventLoopPool>,
    sessions: Arc<SessionStore>,
    auth_enabled: bool,
    max_body_bytes: usize,
}

/// The management web server.
pub struct HttpServer {
    app: Router,
    config: ServerConfig,
    services: Arc<Services>,
    tls: Option<RustlsConfig>,
    authenticator: Arc<MtlsAuthenticator>,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Server exposing the built-in Redfish resources.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_routes(config, redfish::routes)
    }

    /// Server whose route table is built by `routes` from the shared services.
    pub fn with_routes<F>(config: ServerConfig, routes: F) -> Result<Self, ServerError>
    where
        F: FnOnce(Arc<Services>) -> RouteTable,
    {
        let services = Arc::new(Services::new(&config)?);
        let table = routes(Arc::clone(&services));
        tracing::debug!(routes = table.len(), "Route table built");
        let loops = Arc::new(EventLoopPool::start(
            config.event_loops.workers,
            config.event_loops.queue_depth,
            Arc::new(table),
        )?);

        let tls = config.tls.as_ref().map(load_tls_config).transpose()?;

        let state = AppState {
            loops,
            sessions: Arc::clone(&services.sessions),
            auth_enabled: config.auth.enabled,
            max_body_bytes: config.listener.max_body_bytes,
        };
        let app = Self::build_router(&config, state);

        Ok(Self {
            app,
            authenticator: Arc::new(MtlsAuthenticator::new(&config.auth.mtls)),
            config,
            services,
            tls,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let app = Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        headers::apply(app, &config.security, &config.cors)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let listener = listener.into_std()?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining connections");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        let sessions = Arc::clone(&self.services.sessions);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                sessions.apply_timeouts();
            }
        });

        let app = self.app.into_make_service();
        let server = axum_server::from_tcp(listener).handle(handle);

        let result = match self.tls {
            Some(tls) => {
                tracing::info!(
                    address = %addr,
                    mtls = self.authenticator.is_enabled(),
                    "HTTPS server starting"
                );
                let acceptor = MtlsAcceptor::new(tls, Arc::clone(&self.authenticator), self.tracker.clone());
                server.acceptor(acceptor).serve(app).await
            }
            None => {
                tracing::warn!(address = %addr, "HTTP server starting without TLS");
                server.acceptor(PlainAcceptor::new(self.tracker.clone())).serve(app).await
            }
        };

        sweeper.abort();
        self.tracker.drain(Duration::from_secs(1)).await;
        tracing::info!("HTTP server stopped");
        result.map_err(ServerError::from)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Services shared with the route handlers.
    pub fn services(&self) -> Arc<Services> {
        Arc::clone(&self.services)
    }

    pub fn connections(&self) -> ConnectionTracker {
        self.tracker.clone()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(error_body(message))).into_response()
}

/// Authenticate the request and hand it to an event loop.
async fn dispatch_handler(
    State(state): State<AppState>,
    connection: Option<Extension<ConnectionInfo>>,
    request: AxumRequest,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let connection = connection.map(|Extension(info)| info);

    let response = async {
        if parts.version == Version::HTTP_11 && !parts.headers.contains_key(header::HOST) {
            return error_response(StatusCode::BAD_REQUEST, "Missing Host header");
        }

        let session = authenticate(
            connection.as_ref().map(ConnectionInfo::identity),
            &parts.headers,
            state.sessions.as_ref(),
        );
        if state.auth_enabled && session.is_none() && !is_on_allowlist(&path, &method) {
            tracing::info!(request_id = %request_id, path = %path, "Unauthenticated request rejected");
            return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
        }

        let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "Failed to read request body");
                return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
            }
        };

        let mut request = Request::new(parts, body).with_session(session);
        if let Some(addr) = connection.as_ref().and_then(ConnectionInfo::peer_addr) {
            request = request.with_peer_addr(addr);
        }

        let pending = match state.loops.submit(request) {
            Ok(pending) => pending,
            Err(SubmitError::Full) => {
                tracing::warn!(request_id = %request_id, "Event loops saturated, shedding request");
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
            }
            Err(SubmitError::Stopped) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
        };
        match pending.await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(request_id = %request_id, "Request dropped without a response");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
    .await;

    let status = response.status();
    tracing::debug!(
        request_id = %request_id,
        connection_id = ?connection.as_ref().map(ConnectionInfo::id),
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics::record_request(method.as_str(), status.as_u16(), start);
    response
}

/// Bind `addr` and return the listener with its resolved local address.
pub async fn bind(addr: &str) -> Result<(tokio::net::TcpListener, SocketAddr), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}
