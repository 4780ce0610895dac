//! Pooled outbound HTTP(S) client.
//!
//! # Responsibilities
//! - Reuse connections to the same destination across calls
//! - Bound concurrent requests per destination, queueing the excess
//! - Retry idempotent requests on transport failures and 502/503/504
//! - Keep per-destination counters for logs and metrics
//!
//! # Design Decisions
//! - One instance per process, created by the composition root
//! - The connection pool is reqwest's; the destination table is a `DashMap`
//!   so every event loop thread can use the client concurrently
//! - Final non-2xx statuses are returned, not turned into errors

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Semaphore;

use super::request::{OutboundRequest, OutboundResponse};
use super::ClientError;
use crate::config::{ClientConfig, RetryConfig};
use crate::observability::metrics;
use crate::resilience::{is_retryable, retry_delay};

/// Connection accounting for one `scheme://host:port`.
#[derive(Debug)]
struct Destination {
    permits: Semaphore,
    in_flight: AtomicUsize,
    requests: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
}

impl Destination {
    fn new(limit: usize) -> Self {
        Self {
            permits: Semaphore::new(limit),
            in_flight: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }
}

/// Snapshot of one destination's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DestinationStats {
    pub in_flight: usize,
    pub requests: u64,
    pub failures: u64,
    pub retries: u64,
}

/// Decrements the in-flight count when an attempt ends or is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared outbound client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    destinations: Arc<DashMap<String, Arc<Destination>>>,
    max_per_destination: usize,
    retry: RetryConfig,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .no_proxy();

        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|source| ClientError::CaCertificate {
                path: path.clone(),
                source,
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(ClientError::Build)?;
            builder = builder.add_root_certificate(cert);
        }

        let inner = builder.build().map_err(ClientError::Build)?;
        Ok(Self {
            inner,
            destinations: Arc::new(DashMap::new()),
            max_per_destination: config.max_connections_per_destination.max(1),
            retry: config.retry.clone(),
        })
    }

    /// Send `request`, retrying where allowed.
    pub async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, ClientError> {
        let key = request.destination();
        let destination = self.destination(&key);
        let start = Instant::now();

        let _permit = destination
            .permits
            .acquire()
            .await
            .map_err(|_| ClientError::Closed)?;

        let max_attempts = if request.method.is_idempotent() {
            self.retry.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 0;

        loop {
            attempt += 1;
            destination.requests.fetch_add(1, Ordering::Relaxed);

            let result = {
                let _in_flight = InFlight::enter(&destination.in_flight);
                self.attempt(&request).await
            };

            match result {
                Ok(response) => {
                    if attempt < max_attempts
                        && is_retryable(&request.method, Some(response.status), false)
                    {
                        destination.retries.fetch_add(1, Ordering::Relaxed);
                        let delay = retry_delay(&self.retry, attempt);
                        tracing::info!(
                            destination = %key,
                            attempt,
                            status = %response.status,
                            delay = ?delay,
                            "Retrying outbound request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    tracing::debug!(
                        destination = %key,
                        method = %request.method,
                        status = %response.status,
                        attempts = attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Outbound request completed"
                    );
                    metrics::record_outbound(&key, "ok");
                    return Ok(response);
                }
                Err(e) => {
                    destination.failures.fetch_add(1, Ordering::Relaxed);
                    let network_error = matches!(
                        e,
                        ClientError::Connect { .. } | ClientError::Timeout { .. }
                    );
                    if attempt < max_attempts && is_retryable(&request.method, None, network_error) {
                        destination.retries.fetch_add(1, Ordering::Relaxed);
                        let delay = retry_delay(&self.retry, attempt);
                        tracing::info!(
                            destination = %key,
                            attempt,
                            error = %e,
                            delay = ?delay,
                            "Retrying outbound request after error"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    tracing::warn!(destination = %key, attempts = attempt, error = %e, "Outbound request failed");
                    metrics::record_outbound(&key, e.outcome());
                    return Err(e);
                }
            }
        }
    }

    /// Counters for `destination` (`scheme://host:port`).
    pub fn stats(&self, destination: &str) -> Option<DestinationStats> {
        self.destinations.get(destination).map(|d| DestinationStats {
            in_flight: d.in_flight.load(Ordering::SeqCst),
            requests: d.requests.load(Ordering::Relaxed),
            failures: d.failures.load(Ordering::Relaxed),
            retries: d.retries.load(Ordering::Relaxed),
        })
    }

    /// Number of destinations contacted so far.
    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    async fn attempt(&self, request: &OutboundRequest) -> Result<OutboundResponse, ClientError> {
        let key = request.destination();
        let response = self
            .inner
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| ClientError::from_transport(&key, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::from_transport(&key, e))?;

        Ok(OutboundResponse {
            status,
            headers,
            body,
        })
    }

    fn destination(&self, key: &str) -> Arc<Destination> {
        self.destinations
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Destination::new(self.max_per_destination)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 responder replying with `statuses` in turn, then 200.
    async fn backend(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses.get(n).copied().unwrap_or(200);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = format!("{{\"Attempt\":{n}}}");
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}"), hits)
    }

    fn client(max_attempts: u32) -> HttpClient {
        let mut config = ClientConfig::default();
        config.retry.max_attempts = max_attempts;
        config.retry.base_delay_ms = 5;
        config.retry.max_delay_ms = 20;
        HttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn retries_idempotent_request_on_unavailable() {
        let (base, hits) = backend(vec![503, 503]).await;
        let client = client(3);

        let request = OutboundRequest::get(&format!("{base}/redfish/v1")).unwrap();
        let destination = request.destination();
        let response = client.send(request).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json::<serde_json::Value>().unwrap()["Attempt"], 2);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        let stats = client.stats(&destination).unwrap();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn final_error_status_is_a_value() {
        let (base, hits) = backend(vec![503, 503, 503]).await;
        let client = client(2);

        let response = client
            .send(OutboundRequest::get(&format!("{base}/x")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn post_is_not_retried() {
        let (base, hits) = backend(vec![503]).await;
        let client = client(3);

        let response = client
            .send(OutboundRequest::post(&format!("{base}/events")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connection_refused_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(2);
        let err = client
            .send(OutboundRequest::get(&format!("http://{addr}/")).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.outcome(), "connect_error");

        let stats = client.stats(&format!("http://127.0.0.1:{}", addr.port())).unwrap();
        assert_eq!(stats.failures, 2);
        assert_eq!(client.destination_count(), 1);
    }

    #[test]
    fn missing_ca_file_fails_construction() {
        let config = ClientConfig {
            ca_cert_path: Some("/nonexistent/ca.pem".into()),
            ..ClientConfig::default()
        };
        assert!(matches!(
            HttpClient::new(&config),
            Err(ClientError::CaCertificate { .. })
        ));
    }
}
