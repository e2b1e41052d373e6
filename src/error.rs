use crate::transmit::TransmissionOutcome;
use thiserror::Error;

/// Failure raised by a [`Transport`](crate::transport::Transport) when sending a payload.
///
/// This is a closed set: a transport must map every failure it can observe onto one of
/// these three kinds. The write pipeline never inspects anything else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered but rejected the payload (malformed line protocol, schema conflict...).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The server answered with an internal failure.
    #[error("Server error: {0}")]
    ServerError(String),

    /// The server could not be reached at all.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl TransportError {
    /// The transmission outcome this failure classifies to.
    pub fn kind(&self) -> TransmissionOutcome {
        match self {
            TransportError::BadRequest(_) => TransmissionOutcome::BadRequest,
            TransportError::ServerError(_) => TransmissionOutcome::ServerError,
            TransportError::ConnectionFailed(_) => TransmissionOutcome::ConnectionFailed,
        }
    }

    /// Message carried by the failure.
    pub fn message(&self) -> &str {
        match self {
            TransportError::BadRequest(m)
            | TransportError::ServerError(m)
            | TransportError::ConnectionFailed(m) => m,
        }
    }
}

/// Custom error type for client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transmission failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Queries are not supported by the selected transport")]
    QueryNotSupported,

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Failed to decode query response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Background task error: {0}")]
    BackgroundTaskError(String),
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for ClientError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ClientError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::ConfigError(err.to_string())
    }
}
