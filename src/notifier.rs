//! Edge-triggered connection status notifications.
//!
//! The notifier remembers the last connection status and calls the success or error
//! handler only when the status changes. Bad requests are reported separately, every time.

use crate::transmit::TransmissionOutcome;
use std::sync::{Arc, Mutex, MutexGuard};

/// Last known state of the connection to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// Nothing has been transmitted yet.
    #[default]
    Unknown,
    /// The last transmission reached the server.
    Success,
    /// The last transmission could not reach the server.
    Error,
}

pub type StatusHandler = Arc<dyn Fn() + Send + Sync>;
pub type BadRequestHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct NotifierState {
    last_status: ConnectionStatus,
    on_success: Option<StatusHandler>,
    on_error: Option<StatusHandler>,
    on_bad_request: Option<BadRequestHandler>,
}

/// Holds the connection status and the user's handlers.
///
/// Handlers always run after the internal lock is released, so a handler may call back
/// into the notifier (for example to register another handler).
#[derive(Default)]
pub struct ConnectionNotifier {
    state: Mutex<NotifierState>,
}

impl std::fmt::Debug for ConnectionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionNotifier")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ConnectionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().last_status
    }

    /// Moves to `Success`, calling the success handler if the status was anything else.
    /// Returns the previous status when a transition happened.
    pub fn notify_success(&self) -> Option<ConnectionStatus> {
        self.transition(ConnectionStatus::Success)
    }

    /// Moves to `Error`, calling the error handler if the status was anything else.
    /// Returns the previous status when a transition happened.
    pub fn notify_error(&self) -> Option<ConnectionStatus> {
        self.transition(ConnectionStatus::Error)
    }

    /// Calls the bad-request handler. Not edge-triggered: every bad request is reported.
    pub fn notify_bad_request(&self, message: &str) {
        let handler = self.lock().on_bad_request.clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    /// Feeds one classified transmission into the notifier.
    ///
    /// Any outcome where the server answered, including a bad request, counts as the
    /// connection being up. A bad request fires its own handler first.
    /// Returns the previous status when the connection status changed.
    pub fn observe(&self, outcome: TransmissionOutcome, message: &str) -> Option<ConnectionStatus> {
        if outcome == TransmissionOutcome::BadRequest {
            self.notify_bad_request(message);
        }
        if outcome.connection_up() {
            self.notify_success()
        } else {
            self.notify_error()
        }
    }

    /// Registers the success handler, replacing any previous one. If the connection is
    /// already known to be up, the handler is called once before this returns.
    pub fn on_success(&self, handler: StatusHandler) {
        self.register(ConnectionStatus::Success, handler);
    }

    /// Registers the error handler, replacing any previous one. If the connection is
    /// already known to be down, the handler is called once before this returns.
    pub fn on_error(&self, handler: StatusHandler) {
        self.register(ConnectionStatus::Error, handler);
    }

    /// Registers the bad-request handler, replacing any previous one.
    pub fn on_bad_request(&self, handler: BadRequestHandler) {
        self.lock().on_bad_request = Some(handler);
    }

    fn register(&self, status: ConnectionStatus, handler: StatusHandler) {
        let replay = {
            let mut state = self.lock();
            match status {
                ConnectionStatus::Success => state.on_success = Some(handler.clone()),
                ConnectionStatus::Error => state.on_error = Some(handler.clone()),
                ConnectionStatus::Unknown => return,
            }
            state.last_status == status
        };
        if replay {
            handler();
        }
    }

    fn transition(&self, to: ConnectionStatus) -> Option<ConnectionStatus> {
        let (from, handler) = {
            let mut state = self.lock();
            if state.last_status == to {
                return None;
            }
            let from = std::mem::replace(&mut state.last_status, to);
            let handler = match to {
                ConnectionStatus::Success => state.on_success.clone(),
                ConnectionStatus::Error => state.on_error.clone(),
                ConnectionStatus::Unknown => None,
            };
            (from, handler)
        };
        if let Some(handler) = handler {
            handler();
        }
        Some(from)
    }

    // The state is a plain value; a panic in a handler never leaves it half-written,
    // since handlers run outside the lock.
    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
