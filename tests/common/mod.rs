//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use redfish_server::config::ServerConfig;
use redfish_server::http::{bind, HttpServer, ServerError};
use redfish_server::lifecycle::Shutdown;
use redfish_server::redfish::Services;

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub services: Arc<Services>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Issue a token session and return its token.
    pub fn login(&self, username: &str) -> String {
        self.services.sessions.create_session(username, None).token.clone()
    }
}

/// Plain-HTTP config with authentication on and fast outbound timeouts.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.enabled = true;
    config.client.connect_timeout_secs = 1;
    config.client.request_timeout_secs = 2;
    config.client.retry.max_attempts = 1;
    config
}

pub async fn start_server(config: ServerConfig) -> TestServer {
    let (listener, addr) = bind(&config.listener.bind_address).await.unwrap();
    let server = HttpServer::new(config).unwrap();
    let services = server.services();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    TestServer {
        addr,
        services,
        shutdown,
        handle,
    }
}

/// Start a mock satellite on an ephemeral port. `f` maps the request path
/// to a status and a JSON body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = f(path).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });
    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
