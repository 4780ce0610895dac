//! Route table and dispatch.
//!
//! # Responsibilities
//! - Store `(method, pattern) -> handler` entries
//! - Invoke exactly one handler per request
//! - Answer unmatched requests itself: 404, 405 with `Allow`, or OPTIONS
//!
//! # Design Decisions
//! - Immutable after construction, shared by every event loop via `Arc`
//! - First registered match wins
//! - OPTIONS on any routed path is 200 with an empty body; the CORS
//!   headers come from the response header layers

use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};

use super::matcher::PathPattern;
use crate::http::request::{HttpRequest, Request};
use crate::http::AsyncResp;

/// Route handler. Runs on an event loop; may clone `AsyncResp` into
/// locally spawned work.
pub type Handler = Arc<dyn Fn(Rc<Request>, AsyncResp) + Send + Sync>;

struct Route {
    method: Method,
    pattern: PathPattern,
    handler: Handler,
}

/// Immutable route table.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| format!("{} {}", r.method, r.pattern.as_str())))
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(Rc<Request>, AsyncResp) + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method,
            pattern: PathPattern::new(pattern),
            handler: Arc::new(handler),
        });
        self
    }

    /// Register an `async` handler. Its future is spawned on the loop's
    /// `LocalSet` and keeps the response open until it completes.
    pub fn route_async<F, Fut>(self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(Rc<Request>, AsyncResp) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.route(method, pattern, move |req, res| {
            tokio::task::spawn_local(handler(req, res));
        })
    }

    pub fn get<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Rc<Request>, AsyncResp) + Send + Sync + 'static,
    {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Rc<Request>, AsyncResp) + Send + Sync + 'static,
    {
        self.route(Method::POST, pattern, handler)
    }

    pub fn patch<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Rc<Request>, AsyncResp) + Send + Sync + 'static,
    {
        self.route(Method::PATCH, pattern, handler)
    }

    pub fn delete<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Rc<Request>, AsyncResp) + Send + Sync + 'static,
    {
        self.route(Method::DELETE, pattern, handler)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route one request. The caller's share of `res` is consumed.
    pub fn dispatch(&self, mut req: Request, res: AsyncResp) {
        let mut allowed: Vec<&Method> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.pattern.captures(req.url()) else {
                continue;
            };
            if route.method == *req.method() {
                tracing::debug!(
                    request_id = %req.request_id(),
                    pattern = route.pattern.as_str(),
                    "Route matched"
                );
                req.set_params(params);
                (route.handler)(Rc::new(req), res);
                return;
            }
            if !allowed.contains(&&route.method) {
                allowed.push(&route.method);
            }
        }

        if allowed.is_empty() {
            tracing::debug!(request_id = %req.request_id(), path = %req.url(), "No route matched");
            res.res().set_status(StatusCode::NOT_FOUND);
            return;
        }

        let allow = allowed
            .iter()
            .map(|m| m.as_str())
            .chain(std::iter::once("OPTIONS"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut response = res.res();
        if let Ok(value) = HeaderValue::from_str(&allow) {
            response.set_header(header::ALLOW, value);
        }
        if *req.method() != Method::OPTIONS {
            response.set_status(StatusCode::METHOD_NOT_ALLOWED);
        }
    }
}
