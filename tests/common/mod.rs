#![allow(dead_code)] // Not every test binary uses every helper

use fluxline::{ClientError, ClientEvent, ClientEventListener, Transport, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How the fake server answers the next sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Accept,
    Unreachable,
    Reject,
    Failing,
    /// Panics inside `send` once, then accepts.
    PanicOnce,
}

#[derive(Debug)]
struct ServerState {
    mode: Mode,
    received: Vec<String>,
    attempts: Vec<String>,
    delay: Duration,
    query_response: Option<String>,
}

/// In-memory stand-in for the metrics server. Clones share state, so a test keeps one
/// handle and gives another to the client.
#[derive(Debug, Clone)]
pub struct FakeServer(Arc<Mutex<ServerState>>);

impl FakeServer {
    pub fn new(mode: Mode) -> Self {
        FakeServer(Arc::new(Mutex::new(ServerState {
            mode,
            received: Vec::new(),
            attempts: Vec::new(),
            delay: Duration::ZERO,
            query_response: None,
        })))
    }

    pub fn reachable() -> Self {
        Self::new(Mode::Accept)
    }

    pub fn unreachable() -> Self {
        Self::new(Mode::Unreachable)
    }

    pub fn set_mode(&self, mode: Mode) {
        self.0.lock().unwrap().mode = mode;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.0.lock().unwrap().delay = delay;
    }

    pub fn set_query_response(&self, body: &str) {
        self.0.lock().unwrap().query_response = Some(body.to_string());
    }

    /// Payloads the server accepted.
    pub fn received(&self) -> Vec<String> {
        self.0.lock().unwrap().received.clone()
    }

    /// Every payload sent, accepted or not.
    pub fn attempts(&self) -> Vec<String> {
        self.0.lock().unwrap().attempts.clone()
    }

    /// All accepted lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.received()
            .iter()
            .flat_map(|p| p.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

impl Transport for FakeServer {
    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        let delay = self.0.lock().unwrap().delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.0.lock().unwrap();
        state.attempts.push(payload.to_string());
        if state.mode == Mode::PanicOnce {
            state.mode = Mode::Accept;
            drop(state);
            panic!("transport panicked mid-send");
        }
        match state.mode {
            Mode::PanicOnce => unreachable!(),
            Mode::Accept => {
                state.received.push(payload.to_string());
                Ok(())
            }
            Mode::Unreachable => Err(TransportError::ConnectionFailed(
                "connection refused".to_string(),
            )),
            Mode::Reject => Err(TransportError::BadRequest(
                "unable to parse line".to_string(),
            )),
            Mode::Failing => Err(TransportError::ServerError(
                "internal server error".to_string(),
            )),
        }
    }

    fn query(&mut self, _query: &str) -> Result<String, ClientError> {
        self.0
            .lock()
            .unwrap()
            .query_response
            .clone()
            .ok_or(ClientError::QueryNotSupported)
    }
}

/// Shared call counter usable as a callback.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn handler(&self) -> impl Fn() + Send + Sync + 'static {
        let count = self.0.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingListener(Mutex<Vec<ClientEvent>>);

impl RecordingListener {
    pub fn events(&self) -> Vec<ClientEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl ClientEventListener for RecordingListener {
    fn on_event(&self, event: ClientEvent) {
        self.0.lock().unwrap().push(event);
    }
}
