//! Outbound call errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("failed to read CA certificate {path}: {source}")]
    CaCertificate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("could not connect to {destination}: {source}")]
    Connect {
        destination: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {destination} timed out")]
    Timeout { destination: String },

    #[error("request to {destination} failed: {source}")]
    Transport {
        destination: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("client is shut down")]
    Closed,

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) fn from_transport(destination: &str, err: reqwest::Error) -> Self {
        let destination = destination.to_string();
        if err.is_timeout() {
            Self::Timeout { destination }
        } else if err.is_connect() {
            Self::Connect {
                destination,
                source: err,
            }
        } else {
            Self::Transport {
                destination,
                source: err,
            }
        }
    }

    /// Label used in metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect_error",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport_error",
            _ => "invalid_request",
        }
    }
}
