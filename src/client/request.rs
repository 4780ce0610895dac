//! Outbound request and response values.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::ClientError;

/// One outbound call, fully buffered so it can be replayed on retry.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn new(method: Method, url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(url).map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ClientError::InvalidUrl(url.to_string()));
        }
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    pub fn get(url: &str) -> Result<Self, ClientError> {
        Self::new(Method::GET, url)
    }

    pub fn post(url: &str) -> Result<Self, ClientError> {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// JSON body with the matching content type.
    pub fn json<T: Serialize>(mut self, payload: &T) -> Result<Self, ClientError> {
        self.body = Bytes::from(serde_json::to_vec(payload)?);
        self.headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    /// `scheme://host:port` key the connection accounting is grouped by.
    pub fn destination(&self) -> String {
        destination_key(&self.url)
    }
}

pub(crate) fn destination_key(url: &Url) -> String {
    format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}

/// Buffered reply from a destination. Non-2xx statuses are still `Ok`.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_uses_default_ports() {
        let req = OutboundRequest::get("https://Sat1.example.com/redfish/v1").unwrap();
        assert_eq!(req.destination(), "https://sat1.example.com:443");

        let req = OutboundRequest::get("http://127.0.0.1:8080/x").unwrap();
        assert_eq!(req.destination(), "http://127.0.0.1:8080");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            OutboundRequest::get("ftp://example.com/file"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(OutboundRequest::get("not a url").is_err());
    }

    #[test]
    fn json_body_sets_content_type() {
        let req = OutboundRequest::post("http://localhost/events")
            .unwrap()
            .json(&serde_json::json!({"EventType": "Alert"}))
            .unwrap();
        assert_eq!(req.headers[axum::http::header::CONTENT_TYPE], "application/json");
        assert_eq!(&req.body[..], br#"{"EventType":"Alert"}"#);
    }
}
