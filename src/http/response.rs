//! Response abstraction.
//!
//! # Responsibilities
//! - Hold status, headers and the JSON payload while handlers build it
//! - Serialize the payload and write it to the connection exactly once
//! - Map bare error statuses to JSON error bodies
//!
//! # Design Decisions
//! - Finalizing twice is a defect: logged, second call is a no-op
//! - Defaults are 200 with an empty body
//! - Nothing is written once the connection is gone
//! - 200 JSON responses carry a strong ETag; a matching `If-None-Match` gets 304

use std::hash::{DefaultHasher, Hash, Hasher};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::observability::metrics;

/// Wire-level reply produced by a finalized `Response`.
pub type WireResponse = axum::http::Response<Body>;

/// Transport binding a `Response` is written to.
pub trait ResponseWriter {
    /// False once the peer can no longer receive the response.
    fn is_alive(&self) -> bool;
    /// Hand the finished response to the transport.
    fn write(&mut self, response: WireResponse);
}

/// Writes the response back to the connection task awaiting it.
#[derive(Debug)]
pub struct ConnectionWriter {
    tx: Option<oneshot::Sender<WireResponse>>,
}

impl ConnectionWriter {
    pub fn new(tx: oneshot::Sender<WireResponse>) -> Self {
        Self { tx: Some(tx) }
    }
}

impl ResponseWriter for ConnectionWriter {
    fn is_alive(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn write(&mut self, response: WireResponse) {
        match self.tx.take() {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!("Connection closed before response was written");
                }
            }
            None => tracing::error!("Response writer used twice"),
        }
    }
}

/// The single outbound reply under construction.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    json: Value,
    body: Option<Bytes>,
    expected_hash: Option<String>,
    completed: bool,
    writer: Box<dyn ResponseWriter>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("json", &self.json)
            .field("completed", &self.completed)
            .finish()
    }
}

impl Response {
    pub fn new(writer: Box<dyn ResponseWriter>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            json: Value::Null,
            body: None,
            expected_hash: None,
            completed: false,
            writer,
        }
    }

    /// Response bound to a connection's one-shot reply channel.
    pub fn for_connection(tx: oneshot::Sender<WireResponse>) -> Self {
        Self::new(Box::new(ConnectionWriter::new(tx)))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Add a header value, keeping existing values.
    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Replace every value of a header.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn clear_header(&mut self, name: &HeaderName) {
        self.headers.remove(name);
    }

    pub fn header_value(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Mutable payload. Indexing a null payload by key turns it into an object.
    pub fn json_mut(&mut self) -> &mut Value {
        &mut self.json
    }

    /// Copy the fields of `value` into the payload, replacing existing keys.
    /// A non-object `value` replaces the payload.
    pub fn merge_json(&mut self, value: Value) {
        match value {
            Value::Object(fields) if self.json.is_object() => {
                if let Some(target) = self.json.as_object_mut() {
                    target.extend(fields);
                }
            }
            value => self.json = value,
        }
    }

    /// Append raw bytes to a non-JSON body.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) {
        let mut buf = self.body.take().map(Vec::from).unwrap_or_default();
        buf.extend_from_slice(chunk.as_ref());
        self.body = Some(Bytes::from(buf));
    }

    /// Set the status and a JSON error body.
    pub fn set_error(&mut self, status: StatusCode, message: impl Into<String>) {
        self.status = status;
        self.json = error_body(&message.into());
    }

    /// ETag presented by the client in `If-None-Match`.
    pub fn set_expected_hash(&mut self, hash: impl Into<String>) {
        self.expected_hash = Some(hash.into());
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_alive(&self) -> bool {
        self.writer.is_alive()
    }

    /// Finalize: serialize and write to the connection. Only the first call has any effect.
    pub fn end(&mut self) {
        if self.completed {
            tracing::error!(status = %self.status, "Response was ended twice");
            metrics::record_finalized("duplicate");
            return;
        }
        self.completed = true;

        if !self.writer.is_alive() {
            tracing::debug!(status = %self.status, "Connection gone, discarding response");
            metrics::record_finalized("dropped");
            return;
        }

        let response = self.render();
        self.writer.write(response);
        metrics::record_finalized("sent");
    }

    fn render(&mut self) -> WireResponse {
        self.apply_etag();

        let body = match self.body.take() {
            Some(raw) => raw,
            None if json_is_empty(&self.json) => Bytes::new(),
            None => match serde_json::to_vec(&self.json) {
                Ok(bytes) => {
                    self.set_json_content_type();
                    Bytes::from(bytes)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize response body");
                    self.status = StatusCode::INTERNAL_SERVER_ERROR;
                    Bytes::new()
                }
            },
        };

        let body = if self.status.as_u16() >= 400 && body.is_empty() {
            let message = self.status.canonical_reason().unwrap_or("Error");
            self.set_json_content_type();
            Bytes::from(error_body(message).to_string())
        } else {
            body
        };

        let body = if body_forbidden(self.status) {
            if !body.is_empty() {
                tracing::error!(status = %self.status, "Response content provided for a status that forbids it");
            }
            self.headers.remove(header::CONTENT_TYPE);
            Bytes::new()
        } else {
            body
        };

        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        let mut response = WireResponse::new(Body::from(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        response
    }

    fn apply_etag(&mut self) {
        if self.status != StatusCode::OK || self.body.is_some() || json_is_empty(&self.json) {
            return;
        }
        let etag = compute_etag(&self.json);
        if let Ok(value) = HeaderValue::from_str(&etag) {
            self.headers.insert(header::ETAG, value);
        }
        if self.expected_hash.as_deref() == Some(etag.as_str()) {
            self.json = Value::Null;
            self.status = StatusCode::NOT_MODIFIED;
        }
    }

    fn set_json_content_type(&mut self) {
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
    }
}

/// Strong ETag of a JSON payload: 8 hex digits, quoted.
pub fn compute_etag(value: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("\"{:08X}\"", hasher.finish() & 0xFFFF_FFFF)
}

/// Standard error envelope.
pub fn error_body(message: &str) -> Value {
    json!({
        "error": {
            "code": "Base.1.0.GeneralError",
            "message": message,
        }
    })
}

fn json_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn body_forbidden(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}
