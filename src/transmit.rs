//! Classification of transport results.
//!
//! Every send ends in exactly one [`TransmissionOutcome`]. The outcome decides two things:
//! whether the transmitted lines leave the buffer, and which way the connection status moves.

use crate::error::TransportError;
use crate::transport::Transport;
use std::fmt;
use std::time::{Duration, Instant};

/// Closed set of results of one transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmissionOutcome {
    Succeeded,
    ServerError,
    BadRequest,
    ConnectionFailed,
}

impl TransmissionOutcome {
    pub fn classify(result: &Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => TransmissionOutcome::Succeeded,
            Err(e) => e.kind(),
        }
    }

    /// Whether the transmitted batch is removed from the buffer.
    ///
    /// A malformed batch will never succeed when resent unchanged, so `BadRequest` drops it
    /// along with `Succeeded`. Server errors and connection failures are transient and keep
    /// the lines for the next flush.
    pub fn clears_batch(self) -> bool {
        matches!(
            self,
            TransmissionOutcome::Succeeded | TransmissionOutcome::BadRequest
        )
    }

    /// Whether the server was reachable. Everything but `ConnectionFailed` counts as up.
    pub fn connection_up(self) -> bool {
        !matches!(self, TransmissionOutcome::ConnectionFailed)
    }

    /// Stable lowercase name, used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            TransmissionOutcome::Succeeded => "succeeded",
            TransmissionOutcome::ServerError => "server_error",
            TransmissionOutcome::BadRequest => "bad_request",
            TransmissionOutcome::ConnectionFailed => "connection_failed",
        }
    }
}

impl fmt::Display for TransmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of sending one payload.
#[derive(Debug, Clone)]
pub struct Transmission {
    pub outcome: TransmissionOutcome,
    /// The transport failure, if the send did not succeed.
    pub error: Option<TransportError>,
    pub elapsed: Duration,
}

impl Transmission {
    pub fn into_result(self) -> Result<(), TransportError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Sends `payload` and classifies the result.
pub fn transmit(transport: &mut dyn Transport, payload: &str) -> Transmission {
    let started = Instant::now();
    let result = transport.send(payload);
    let elapsed = started.elapsed();
    Transmission {
        outcome: TransmissionOutcome::classify(&result),
        error: result.err(),
        elapsed,
    }
}
