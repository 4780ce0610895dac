//! Request abstraction.
//!
//! # Responsibilities
//! - Wrap a fully read wire-level request (head + buffered body)
//! - Expose method, URL, headers, body and the attached session
//! - Carry path parameters filled in by the router
//!
//! # Design Decisions
//! - Accessors return views borrowed from the request; anything kept past
//!   the request's lifetime must be copied by the caller
//! - Header lookup is case-insensitive and multi-valued (`HeaderMap`)
//! - Handlers depend on the `HttpRequest` capability set, not the concrete type

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{request::Parts, HeaderMap, Method, Uri, Version};
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::auth::Session;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// What handlers may ask of an inbound request.
pub trait HttpRequest {
    fn method(&self) -> &Method;
    /// Request path, without query string.
    fn url(&self) -> &str;
    /// First value of a header.
    fn header(&self, name: &str) -> Option<&str>;
    /// Every value of a header, in arrival order.
    fn header_all(&self, name: &str) -> Vec<&str>;
    fn body(&self) -> &[u8];
    fn session(&self) -> Option<&Arc<Session>>;
}

/// One inbound HTTP request.
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    body: Bytes,
    session: Option<Arc<Session>>,
    peer_addr: Option<SocketAddr>,
    params: Vec<(String, String)>,
}

impl Request {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            parts,
            body,
            session: None,
            peer_addr: None,
            params: Vec::new(),
        }
    }

    /// Build a request from an in-memory `http::Request`.
    pub fn from_http(request: axum::http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body)
    }

    pub fn with_session(mut self, session: Option<Arc<Session>>) -> Self {
        self.session = session;
        self
    }

    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Path plus query, as sent by the client.
    pub fn target(&self) -> &str {
        self.parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.parts.uri.path())
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Correlation id assigned at the edge.
    pub fn request_id(&self) -> &str {
        self.header(X_REQUEST_ID).unwrap_or("unknown")
    }

    /// First value of a decoded query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.parts.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Path parameter captured by the matched route pattern.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn set_params(&mut self, params: Vec<(String, String)>) {
        self.params = params;
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Whether the client asked to keep the connection open.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match self.parts.version {
            Version::HTTP_10 => connection.as_deref() == Some("keep-alive"),
            _ => connection.as_deref() != Some("close"),
        }
    }
}

impl HttpRequest for Request {
    fn method(&self) -> &Method {
        &self.parts.method
    }

    fn url(&self) -> &str {
        self.parts.uri.path()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn header_all(&self, name: &str) -> Vec<&str> {
        self.parts
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionType;

    fn request(builder: axum::http::request::Builder, body: &'static str) -> Request {
        Request::from_http(builder.body(Bytes::from_static(body.as_bytes())).unwrap())
    }

    #[test]
    fn exposes_url_and_target() {
        let req = request(
            axum::http::Request::builder().uri("/redfish/v1/Systems?$expand=.&only"),
            "",
        );
        assert_eq!(req.url(), "/redfish/v1/Systems");
        assert_eq!(req.target(), "/redfish/v1/Systems?$expand=.&only");
        assert_eq!(req.query_param("$expand").as_deref(), Some("."));
        assert_eq!(req.query_param("only").as_deref(), Some(""));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn header_lookup_is_case_insensitive_and_multi_valued() {
        let req = request(
            axum::http::Request::builder()
                .uri("/")
                .header("Accept", "application/json")
                .header("accept", "text/html"),
            "",
        );
        assert_eq!(req.header("ACCEPT"), Some("application/json"));
        assert_eq!(req.header_all("accept"), vec!["application/json", "text/html"]);
        assert!(req.header("x-missing").is_none());
        assert_eq!(req.request_id(), "unknown");
    }

    #[test]
    fn json_body_and_session() {
        let req = request(
            axum::http::Request::builder().method(Method::PATCH).uri("/x"),
            r#"{"Name":"BIOS"}"#,
        );
        let value: serde_json::Value = req.json().unwrap();
        assert_eq!(value["Name"], "BIOS");
        assert!(req.session().is_none());

        let session = Arc::new(Session::new("alice", None, SessionType::MutualTls));
        let req = req.with_session(Some(session.clone()));
        assert_eq!(req.session().map(|s| s.username.as_str()), Some("alice"));
        assert_eq!(req.method(), Method::PATCH);
    }

    #[test]
    fn keep_alive_by_version() {
        let req = request(axum::http::Request::builder().uri("/"), "");
        assert!(req.keep_alive());

        let req = request(
            axum::http::Request::builder().uri("/").header("Connection", "close"),
            "",
        );
        assert!(!req.keep_alive());

        let req = request(
            axum::http::Request::builder().uri("/").version(Version::HTTP_10),
            "",
        );
        assert!(!req.keep_alive());
    }
}
