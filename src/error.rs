//! Error Module
//!
//! Defines error types and result types used throughout the proxy and the purge job.

use thiserror::Error;

/// Main error type for the proxy
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transport-level failure talking to the origin. Never retried.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Object store rejected or failed a put/list/delete call.
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("System error: {0}")]
    SystemError(String),
}

impl ProxyError {
    /// Whether this error came from the upstream transport rather than from
    /// local request handling.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamUnavailable(_)
                | ProxyError::ConnectionError(_)
                | ProxyError::TimeoutError(_)
        )
    }
}

/// A purge run that stopped early. Carries the number of keys already
/// deleted so the operator knows how far the run got before re-running.
#[derive(Error, Debug, Clone)]
#[error("purge aborted after deleting {deleted} keys: {source}")]
pub struct PurgeFailure {
    pub deleted: u64,
    pub source: ProxyError,
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::IoError(err.to_string())
    }
}

impl From<hyper::Error> for ProxyError {
    fn from(err: hyper::Error) -> Self {
        ProxyError::HttpError(err.to_string())
    }
}

impl From<hyper::http::Error> for ProxyError {
    fn from(err: hyper::http::Error) -> Self {
        ProxyError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        ProxyError::SerializationError(err.to_string())
    }
}

/// Result type alias for the proxy
pub type Result<T> = std::result::Result<T, ProxyError>;
