//! Retry rules for outbound calls.
//!
//! # Responsibilities
//! - Decide whether a failed or unsuccessful attempt may be repeated
//!
//! # Design Decisions
//! - Only idempotent methods are retried
//! - Connection errors and timeouts are always retryable
//! - Of the statuses, only 502/503/504 are; everything else is a final answer

use axum::http::{Method, StatusCode};

/// Whether an attempt with `method` that ended in `status` (or in a
/// transport error when `network_error` is set) should be retried.
pub fn is_retryable(method: &Method, status: Option<StatusCode>, network_error: bool) -> bool {
    if !method.is_idempotent() {
        return false;
    }
    if network_error {
        return true;
    }
    matches!(
        status,
        Some(StatusCode::BAD_GATEWAY)
            | Some(StatusCode::SERVICE_UNAVAILABLE)
            | Some(StatusCode::GATEWAY_TIMEOUT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_methods_only() {
        assert!(is_retryable(&Method::GET, None, true));
        assert!(is_retryable(&Method::PUT, None, true));
        assert!(!is_retryable(&Method::POST, None, true));
        assert!(!is_retryable(&Method::PATCH, Some(StatusCode::SERVICE_UNAVAILABLE), false));
    }

    #[test]
    fn gateway_statuses_only() {
        assert!(is_retryable(&Method::GET, Some(StatusCode::BAD_GATEWAY), false));
        assert!(is_retryable(&Method::GET, Some(StatusCode::GATEWAY_TIMEOUT), false));
        assert!(!is_retryable(&Method::GET, Some(StatusCode::INTERNAL_SERVER_ERROR), false));
        assert!(!is_retryable(&Method::GET, Some(StatusCode::NOT_FOUND), false));
        assert!(!is_retryable(&Method::GET, None, false));
    }
}
