//! Redfish resources served by the core.
//!
//! # Data Flow
//! ```text
//! Event loop
//!     → routing::Router (method + path pattern)
//!     → handler (service_root.rs, bios.rs, sessions.rs, chassis.rs)
//!     → AsyncResp shares, outbound calls via Services::client
//!     → last share dropped → response finalized
//! ```
//!
//! # Design Decisions
//! - Handlers only assemble JSON; status, headers and finalization belong
//!   to the response layer
//! - Everything a handler needs arrives through `Services`, built once

pub mod bios;
pub mod chassis;
pub mod service_root;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use uuid::Uuid;

use crate::auth::SessionStore;
use crate::client::{ClientError, HttpClient};
use crate::config::{SatelliteConfig, ServerConfig};
use crate::routing::Router;

/// Shared dependencies of the route handlers.
#[derive(Debug)]
pub struct Services {
    pub client: HttpClient,
    pub sessions: Arc<SessionStore>,
    pub satellites: Vec<SatelliteConfig>,
    /// Stable for the life of the process.
    pub service_uuid: Uuid,
}

impl Services {
    pub fn new(config: &ServerConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: HttpClient::new(&config.client)?,
            sessions: Arc::new(SessionStore::new(Duration::from_secs(
                config.auth.session_timeout_secs,
            ))),
            satellites: config.aggregation.satellites.clone(),
            service_uuid: Uuid::new_v4(),
        })
    }

    pub fn satellite(&self, prefix: &str) -> Option<&SatelliteConfig> {
        self.satellites.iter().find(|s| s.prefix == prefix)
    }
}

/// The built-in route table.
pub fn routes(services: Arc<Services>) -> Router {
    let root = Arc::clone(&services);
    let session_service = Arc::clone(&services);
    let session_list = Arc::clone(&services);
    let session_get = Arc::clone(&services);
    let session_delete = Arc::clone(&services);
    let chassis_list = Arc::clone(&services);
    let chassis_get = services;

    Router::new()
        .get("/redfish", service_root::versions)
        .get("/redfish/v1", move |req, res| service_root::service_root(&root, &req, res))
        .get("/redfish/v1/odata", service_root::odata)
        .get("/redfish/v1/Bios", bios::bios)
        .get("/redfish/v1/SessionService", move |req, res| {
            sessions::session_service(&session_service, &req, res)
        })
        .get("/redfish/v1/SessionService/Sessions", move |req, res| {
            sessions::collection(&session_list, &req, res)
        })
        .get("/redfish/v1/SessionService/Sessions/{id}", move |req, res| {
            sessions::get(&session_get, &req, res)
        })
        .delete("/redfish/v1/SessionService/Sessions/{id}", move |req, res| {
            sessions::delete(&session_delete, &req, res)
        })
        .get("/redfish/v1/Chassis", move |req, res| {
            chassis::collection(&chassis_list, &req, res)
        })
        .route_async(Method::GET, "/redfish/v1/Chassis/{id}", move |req, res| {
            chassis::get(Arc::clone(&chassis_get), req, res)
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::http::request::Request;
    use crate::http::response::testing::Recorder;
    use crate::http::AsyncResp;
    use bytes::Bytes;

    pub fn services(config: &ServerConfig) -> Arc<Services> {
        Arc::new(Services::new(config).unwrap())
    }

    pub fn request(method: Method, uri: &str) -> Request {
        Request::from_http(
            axum::http::Request::builder()
                .method(method)
                .uri(uri)
                .body(Bytes::new())
                .unwrap(),
        )
    }

    /// Dispatch synchronously and return the single written response.
    pub async fn call(router: &Router, req: Request) -> (axum::http::StatusCode, serde_json::Value) {
        let recorder = Recorder::default();
        router.dispatch(req, AsyncResp::new(recorder.response()));
        assert_eq!(recorder.count(), 1);
        let wire = recorder.take();
        let status = wire.status();
        let body = crate::http::response::testing::body_string(wire).await;
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&body).unwrap()
        };
        (status, value)
    }
}
