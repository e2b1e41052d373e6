//! Client facade: the write API, batching, the background flush thread and connection
//! health reporting.

use crate::buffer::{Batch, BatchBuffer};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::line_protocol::{encode, GlobalTags};
use crate::notifier::{ConnectionNotifier, ConnectionStatus};
use crate::query::parse_response;
use crate::scheduler::{FlushScheduler, FlushTarget, SchedulerState};
use crate::telemetry::{client_metrics, ClientEvent, ClientEventListener};
use crate::transmit::{transmit, Transmission, TransmissionOutcome};
use crate::transport::Transport;
use crate::types::Point;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

/// What happened to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The point was buffered and will go out with a later flush.
    Buffered,
    /// The point was buffered, crossed the batch size, and the resulting flush ended with
    /// this outcome.
    Flushed(TransmissionOutcome),
    /// Batching is off and the point was accepted by the transport.
    Sent,
}

/// State shared between the caller-facing [`Client`] and the flush thread.
///
/// Lock order: `transport` before `buffer`. The buffer lock is only ever held for short,
/// I/O-free sections; the transport lock spans one whole flush (snapshot, send, clear),
/// which serialises flushes without blocking writers.
///
/// The transport lock is taken through [`Shared::transport`], which recovers it after a
/// panic in a transport or callback. The interrupted batch was never cleared, so the next
/// flush simply retries it.
struct Shared {
    buffer: Mutex<BatchBuffer>,
    transport: Mutex<Box<dyn Transport>>,
    global_tags: RwLock<GlobalTags>,
    notifier: ConnectionNotifier,
    events: Arc<dyn ClientEventListener>,
}

impl Shared {
    fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(&self, point: &Point) -> Result<String, ClientError> {
        let tags = self.global_tags.read()?;
        Ok(encode(point, &tags))
    }

    /// Sends whatever is buffered. Returns `None` if batching is off or nothing was pending.
    fn flush_batch(&self) -> Result<Option<TransmissionOutcome>, ClientError> {
        let mut transport = self.transport();

        let batch = {
            let mut buffer = self.buffer.lock()?;
            if !buffer.is_batching() {
                return Ok(None);
            }
            buffer.snapshot()
        };
        let Some(batch) = batch else {
            return Ok(None);
        };

        let tx = transmit(transport.as_mut(), &batch.payload);

        let remaining = {
            let mut buffer = self.buffer.lock()?;
            if tx.outcome.clears_batch() {
                buffer.clear_front(batch.lines);
            }
            buffer.len()
        };
        client_metrics::record_buffered_lines(remaining);

        self.report_batch(&batch, &tx);
        Ok(Some(tx.outcome))
    }

    /// Sends a payload right away, bypassing the buffer.
    fn send_now(&self, payload: &str, lines: usize) -> Result<WriteStatus, ClientError> {
        let mut transport = self.transport();
        let tx = transmit(transport.as_mut(), payload);
        client_metrics::record_transmission(tx.outcome, lines, tx.elapsed);
        self.report_status(&tx);
        drop(transport);

        tx.into_result()?;
        Ok(WriteStatus::Sent)
    }

    fn report_batch(&self, batch: &Batch, tx: &Transmission) {
        client_metrics::record_transmission(tx.outcome, batch.lines, tx.elapsed);

        let error = tx
            .error
            .as_ref()
            .map(|e| e.message().to_string())
            .unwrap_or_default();
        let event = match tx.outcome {
            TransmissionOutcome::Succeeded => ClientEvent::BatchTransmitted {
                lines: batch.lines,
                bytes: batch.payload.len(),
            },
            TransmissionOutcome::BadRequest => ClientEvent::BatchDropped {
                lines: batch.lines,
                error,
            },
            outcome => ClientEvent::BatchRetained {
                lines: batch.lines,
                outcome,
                error,
            },
        };
        self.events.on_event(event);

        self.report_status(tx);
    }

    // Runs with the transport lock held so notifications arrive in transmission order.
    fn report_status(&self, tx: &Transmission) {
        let message = tx.error.as_ref().map(|e| e.message()).unwrap_or("");
        if let Some(from) = self.notifier.observe(tx.outcome, message) {
            self.events.on_event(ClientEvent::ConnectionStatusChanged {
                from,
                to: self.notifier.status(),
            });
        }
    }
}

impl FlushTarget for Shared {
    fn time_until_flush(&self) -> Option<Duration> {
        match self.buffer.lock() {
            Ok(buffer) => buffer.time_until_flush(),
            Err(e) => {
                self.events.on_event(ClientEvent::BackgroundFlushFailed {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    fn flush(&self) {
        if let Err(e) = self.flush_batch() {
            self.events.on_event(ClientEvent::BackgroundFlushFailed {
                error: e.to_string(),
            });
        }
    }
}

/// Thread-safe line-protocol client with optional batching.
///
/// Without batching every [`write`](Self::write) is transmitted immediately and transport
/// failures come back as errors. After [`configure`](Self::configure) writes are buffered
/// and go out when the batch size is reached, when the flush interval elapses, or on
/// [`flush_now`](Self::flush_now); transport failures are then reported only through the
/// connection callbacks, and transient failures keep the lines for the next flush.
///
/// Callbacks run on whichever thread performed the transmission, while that transmission
/// still holds the transport. They must not call back into this client's write or flush
/// methods.
pub struct Client {
    shared: Arc<Shared>,
    scheduler: Mutex<FlushScheduler>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("status", &self.shared.notifier.status())
            .field("scheduler", &self.scheduler_state())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates an unbatched client over `transport`.
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::build(Box::new(transport), crate::telemetry::noop_event_listener())
    }

    /// Creates a client from a full configuration, applying its global tags and batching.
    ///
    /// # Errors
    /// Returns an error if the flush thread cannot be spawned.
    pub fn with_config<T: Transport>(transport: T, config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::build(Box::new(transport), config.event_listener.clone());
        for (key, value) in &config.global_tags {
            client.add_global_tag(key, value)?;
        }
        if let Some(batching) = config.batching {
            client.configure(batching.batch_size, batching.flush_interval)?;
        }
        Ok(client)
    }

    fn build(transport: Box<dyn Transport>, events: Arc<dyn ClientEventListener>) -> Self {
        let shared = Arc::new(Shared {
            buffer: Mutex::new(BatchBuffer::new()),
            transport: Mutex::new(transport),
            global_tags: RwLock::new(GlobalTags::default()),
            notifier: ConnectionNotifier::new(),
            events: events.clone(),
        });
        Client {
            shared,
            scheduler: Mutex::new(FlushScheduler::new(events)),
        }
    }

    /// Writes one point.
    ///
    /// With batching on this never fails because of the transport: it returns `Buffered`,
    /// or `Flushed(outcome)` if the point filled the batch and this call performed the
    /// flush. With batching off the point is sent synchronously and a transport failure is
    /// returned as [`ClientError::Transport`].
    ///
    /// # Errors
    /// Returns `LockError` if internal state was poisoned by a panicking thread, and
    /// `Transport` for failed unbatched sends.
    pub fn write(&self, point: Point) -> Result<WriteStatus, ClientError> {
        let line = self.shared.encode(&point)?;
        client_metrics::record_points_written(1);

        let mut buffer = self.shared.buffer.lock()?;
        if !buffer.is_batching() {
            drop(buffer);
            let mut payload = line;
            payload.push('\n');
            return self.shared.send_now(&payload, 1);
        }
        let crossed = buffer.append(line);
        drop(buffer);

        self.after_append(crossed)
    }

    /// Writes several points. Batched: all lines are appended under one lock and at most
    /// one flush follows. Unbatched: the points go out as a single payload.
    /// An empty iterator is a no-op returning `Buffered`.
    pub fn write_all<I>(&self, points: I) -> Result<WriteStatus, ClientError>
    where
        I: IntoIterator<Item = Point>,
    {
        let lines: Vec<String> = {
            let tags = self.shared.global_tags.read()?;
            points.into_iter().map(|p| encode(&p, &tags)).collect()
        };
        if lines.is_empty() {
            return Ok(WriteStatus::Buffered);
        }
        client_metrics::record_points_written(lines.len() as u64);

        let mut buffer = self.shared.buffer.lock()?;
        if !buffer.is_batching() {
            drop(buffer);
            let count = lines.len();
            let mut payload = lines.join("\n");
            payload.push('\n');
            return self.shared.send_now(&payload, count);
        }
        let crossed = buffer.extend(lines);
        drop(buffer);

        self.after_append(crossed)
    }

    fn after_append(&self, crossed: bool) -> Result<WriteStatus, ClientError> {
        if !crossed {
            return Ok(WriteStatus::Buffered);
        }
        Ok(match self.shared.flush_batch()? {
            Some(outcome) => WriteStatus::Flushed(outcome),
            // Another flush took the lines first.
            None => WriteStatus::Buffered,
        })
    }

    /// Enables batching with the given batch size and flush interval.
    ///
    /// A nonzero interval starts the background flush thread, or wakes a running one so the
    /// new interval applies at once; a zero interval stops and joins it while buffering
    /// stays on. May be called at any time, including with points already buffered.
    ///
    /// # Errors
    /// Returns an error if a lock is poisoned or the flush thread cannot be spawned.
    pub fn configure(&self, batch_size: usize, flush_interval: Duration) -> Result<(), ClientError> {
        self.shared
            .buffer
            .lock()?
            .configure(batch_size, flush_interval);

        let mut scheduler = self.scheduler.lock()?;
        if flush_interval.is_zero() {
            scheduler.stop();
        } else if scheduler.is_running() {
            scheduler.wake();
        } else {
            let target: Arc<dyn FlushTarget> = self.shared.clone();
            scheduler.start(target).map_err(|e| {
                ClientError::BackgroundTaskError(format!("Failed to spawn flush thread: {}", e))
            })?;
        }
        Ok(())
    }

    /// Flushes buffered points now. Returns the outcome, or `None` if batching is off or
    /// nothing was buffered. Transport failures are reported as outcomes, not errors.
    pub fn flush_now(&self) -> Result<Option<TransmissionOutcome>, ClientError> {
        self.shared.flush_batch()
    }

    /// Adds a tag merged into every point written from now on.
    pub fn add_global_tag(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.shared.global_tags.write()?.push(key, value);
        Ok(())
    }

    /// Called when the connection goes down. Called at once if it is already down.
    pub fn on_connection_error<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.notifier.on_error(Arc::new(handler));
    }

    /// Called when the connection comes up. Called at once if it is already up.
    pub fn on_transmission_succeeded<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.notifier.on_success(Arc::new(handler));
    }

    /// Called with the server's message every time it rejects a payload as malformed.
    pub fn on_bad_request<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.notifier.on_bad_request(Arc::new(handler));
    }

    /// Runs a query through the transport and decodes the response.
    ///
    /// # Errors
    /// `QueryNotSupported` if the transport cannot query; decoding and server errors otherwise.
    pub fn query(&self, query: &str) -> Result<Vec<Point>, ClientError> {
        let body = self.shared.transport().query(query)?;
        parse_response(&body)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.shared.notifier.status()
    }

    /// Number of lines waiting to be flushed.
    pub fn buffered_lines(&self) -> Result<usize, ClientError> {
        Ok(self.shared.buffer.lock()?.len())
    }

    pub fn is_batching(&self) -> Result<bool, ClientError> {
        Ok(self.shared.buffer.lock()?.is_batching())
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }
}

/// Stops the flush thread, then flushes whatever is still buffered.
impl Drop for Client {
    fn drop(&mut self) {
        self.scheduler
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();

        let batching = self
            .shared
            .buffer
            .lock()
            .map(|b| b.is_batching())
            .unwrap_or(false);
        if batching {
            if let Err(e) = self.shared.flush_batch() {
                self.shared.events.on_event(ClientEvent::BackgroundFlushFailed {
                    error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Script {
        sent: Vec<String>,
        failures: VecDeque<TransportError>,
    }

    #[derive(Clone, Default)]
    struct ScriptedTransport(Arc<Mutex<Script>>);

    impl ScriptedTransport {
        fn fail_next(&self, error: TransportError) {
            self.0.lock().unwrap().failures.push_back(error);
        }

        fn sent(&self) -> Vec<String> {
            self.0.lock().unwrap().sent.clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, payload: &str) -> Result<(), TransportError> {
            let mut script = self.0.lock().unwrap();
            if let Some(e) = script.failures.pop_front() {
                return Err(e);
            }
            script.sent.push(payload.to_string());
            Ok(())
        }
    }

    fn point(v: i64) -> Point {
        Point::new("m").add_field("v", v)
    }

    #[test]
    fn test_unbatched_write_sends_immediately() {
        let transport = ScriptedTransport::default();
        let client = Client::new(transport.clone());

        assert_eq!(client.write(point(1)).unwrap(), WriteStatus::Sent);
        assert_eq!(transport.sent(), vec!["m v=1i\n"]);
        assert_eq!(client.connection_status(), ConnectionStatus::Success);
    }

    #[test]
    fn test_unbatched_write_propagates_failure() {
        let transport = ScriptedTransport::default();
        let client = Client::new(transport.clone());
        transport.fail_next(TransportError::ConnectionFailed("refused".into()));

        match client.write(point(1)) {
            Err(ClientError::Transport(TransportError::ConnectionFailed(msg))) => {
                assert_eq!(msg, "refused")
            }
            other => panic!("expected ConnectionFailed, got {:?}", other),
        }
        assert_eq!(client.connection_status(), ConnectionStatus::Error);
    }

    #[test]
    fn test_batched_write_waits_for_capacity() {
        let transport = ScriptedTransport::default();
        let client = Client::new(transport.clone());
        client.configure(3, Duration::ZERO).unwrap();

        assert_eq!(client.write(point(1)).unwrap(), WriteStatus::Buffered);
        assert_eq!(client.write(point(2)).unwrap(), WriteStatus::Buffered);
        assert!(transport.sent().is_empty());

        assert_eq!(
            client.write(point(3)).unwrap(),
            WriteStatus::Flushed(TransmissionOutcome::Succeeded)
        );
        assert_eq!(transport.sent(), vec!["m v=1i\nm v=2i\nm v=3i\n"]);
        assert_eq!(client.buffered_lines().unwrap(), 0);
    }

    #[test]
    fn test_flush_now_on_unbatched_client_is_noop() {
        let client = Client::new(ScriptedTransport::default());
        assert_eq!(client.flush_now().unwrap(), None);
    }

    #[test]
    fn test_global_tags_apply_to_writes() {
        let transport = ScriptedTransport::default();
        let client = Client::new(transport.clone());
        client.add_global_tag("host", "web-1").unwrap();

        client.write(point(1).add_tag("core", "0")).unwrap();
        assert_eq!(transport.sent(), vec!["m,host=web-1,core=0 v=1i\n"]);
    }

    #[test]
    fn test_write_all_unbatched_sends_one_payload() {
        let transport = ScriptedTransport::default();
        let client = Client::new(transport.clone());

        client.write_all(vec![point(1), point(2)]).unwrap();
        assert_eq!(transport.sent(), vec!["m v=1i\nm v=2i\n"]);
    }

    #[test]
    fn test_configure_zero_interval_stops_scheduler() {
        let client = Client::new(ScriptedTransport::default());
        client.configure(10, Duration::from_secs(60)).unwrap();
        assert_eq!(client.scheduler_state(), SchedulerState::Running);
        client.configure(10, Duration::ZERO).unwrap();
        assert_eq!(client.scheduler_state(), SchedulerState::Stopped);
        assert!(client.is_batching().unwrap());
    }

    #[test]
    fn test_query_not_supported_by_default() {
        let client = Client::new(ScriptedTransport::default());
        assert!(matches!(
            client.query("SELECT * FROM m"),
            Err(ClientError::QueryNotSupported)
        ));
    }
}
