//! Error types for rule registration, request parsing, and real-time
//! transport failures.

use thiserror::Error;

/// A malformed rule, client, or context definition.
///
/// Always raised when configuration is registered or loaded, never while
/// matching or mutating a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rule {index}: path pattern cannot be empty")]
    EmptyPathPattern { index: usize },

    #[error("rule {index}: invalid HTTP method {method:?}")]
    InvalidMethod { index: usize, method: String },

    #[error("rule {index}: invalid error status code {status} (expected 100-599)")]
    InvalidStatusCode { index: usize, status: u16 },

    #[error("rule {index}: duplicate {kind} key {key:?}")]
    DuplicateKey {
        index: usize,
        kind: &'static str,
        key: String,
    },

    #[error("rule {index}: invalid header {name:?}")]
    InvalidHeader { index: usize, name: String },

    #[error("rule {index}: {kind} key cannot be empty")]
    EmptyKey { index: usize, kind: &'static str },

    #[error("client name cannot be empty")]
    EmptyClientName,

    #[error("client {0:?} is already registered")]
    DuplicateClient(String),

    #[error("invalid context name {0:?}")]
    InvalidContextName(String),

    #[error("context {0:?} is defined more than once")]
    DuplicateContext(String),

    #[error("context {name:?}: invalid payload template: {reason}")]
    InvalidPayloadTemplate { name: String, reason: String },

    #[error("client {client:?}: {source}")]
    InClient {
        client: String,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Attach the owning client name to a rule error.
    pub fn in_client(self, client: &str) -> Self {
        ConfigError::InClient {
            client: client.to_string(),
            source: Box::new(self),
        }
    }
}

/// A request that cannot be represented as an HTTP request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("invalid header {0:?}")]
    InvalidHeader(String),
}

/// A failure reported by a real-time transport primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection {0} is not known to the transport")]
    UnknownConnection(String),

    #[error("connection {0} is closed")]
    ConnectionClosed(String),

    #[error("send buffer for connection {0} is full")]
    BufferFull(String),
}
