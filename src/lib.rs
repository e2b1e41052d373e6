#![doc = include_str!("../README.md")]
// Declare modules
pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod line_protocol;
pub mod notifier;
pub mod query;
pub mod scheduler;
pub mod telemetry;
pub mod transmit;
pub mod transport;
pub mod types;

/// Main entry point: the batching line-protocol client.
pub use crate::client::{Client, WriteStatus};
/// Configuration options for the client.
pub use crate::config::{BatchSettings, ClientConfig, ClientFileConfig};
/// Error types for client and transport operations.
pub use crate::error::{ClientError, TransportError};
/// Last known connection state reported to callbacks.
pub use crate::notifier::ConnectionStatus;
/// Structured event hook for observability.
pub use crate::telemetry::{ClientEvent, ClientEventListener, LogEventListener};
/// Closed set of transmission results.
pub use crate::transmit::TransmissionOutcome;
/// Transport capability and the UDP implementation.
pub use crate::transport::{Transport, UdpTransport};
/// A measurement point and its field values.
pub use crate::types::{FieldValue, Point, Timestamp};
