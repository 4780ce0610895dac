//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS/TCP connection (ConnectionInfo attached by net::acceptor)
//!     → server.rs (middleware, Host check, authentication, body limit)
//!     → event_loop.rs (round-robin onto a loop thread)
//!     → request.rs (Request with session and route params)
//!     → routing::Router → handler holding an AsyncResp share
//!     → async_resp.rs (last share dropped → finalize)
//!     → response.rs (ETag, error body, headers) → back to the connection
//! ```

pub mod async_resp;
pub mod event_loop;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use async_resp::AsyncResp;
pub use event_loop::{EventLoopPool, SubmitError};
pub use request::{HttpRequest, Request, X_REQUEST_ID};
pub use response::Response;
pub use server::{bind, HttpServer, ServerError};
