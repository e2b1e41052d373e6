use std::sync::Arc;

use crate::notifier::ConnectionStatus;
use crate::transmit::TransmissionOutcome;

/// Structured, in-process event hook for observability.
///
/// The client never prints. Callers provide an implementation that forwards these events
/// wherever they like; [`LogEventListener`] sends them to the `log` facade.
pub trait ClientEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: ClientEvent);
}

/// Structured events emitted by the write pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    FlushThreadStarted,
    FlushThreadStopping,
    FlushThreadPanicked,

    /// A batch reached the server and was accepted.
    BatchTransmitted { lines: usize, bytes: usize },
    /// A batch failed transiently and stays buffered for the next flush.
    BatchRetained {
        lines: usize,
        outcome: TransmissionOutcome,
        error: String,
    },
    /// The server rejected a batch; its lines were dropped.
    BatchDropped { lines: usize, error: String },

    ConnectionStatusChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },

    /// A flush started by the background thread could not run (e.g. a poisoned lock).
    BackgroundFlushFailed { error: String },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl ClientEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: ClientEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn ClientEventListener> {
    Arc::new(NoopEventListener)
}

/// Forwards events to the `log` facade under the `fluxline` target.
#[derive(Debug, Default)]
pub struct LogEventListener;

impl ClientEventListener for LogEventListener {
    fn on_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::FlushThreadStarted => log::debug!(target: "fluxline", "flush thread started"),
            ClientEvent::FlushThreadStopping => log::debug!(target: "fluxline", "flush thread stopping"),
            ClientEvent::FlushThreadPanicked => log::error!(target: "fluxline", "flush thread panicked"),
            ClientEvent::BatchTransmitted { lines, bytes } => {
                log::debug!(target: "fluxline", "transmitted {} lines ({} bytes)", lines, bytes)
            }
            ClientEvent::BatchRetained { lines, outcome, error } => log::warn!(
                target: "fluxline",
                "keeping {} lines for retry after {}: {}",
                lines,
                outcome,
                error
            ),
            ClientEvent::BatchDropped { lines, error } => {
                log::warn!(target: "fluxline", "server rejected {} lines, dropping them: {}", lines, error)
            }
            ClientEvent::ConnectionStatusChanged { from, to } => {
                log::info!(target: "fluxline", "connection status {:?} -> {:?}", from, to)
            }
            ClientEvent::BackgroundFlushFailed { error } => {
                log::error!(target: "fluxline", "background flush failed: {}", error)
            }
        }
    }
}

pub fn log_event_listener() -> Arc<dyn ClientEventListener> {
    Arc::new(LogEventListener)
}

/// Metrics instrumentation through the `metrics` facade.
///
/// Emitting is effectively free until a recorder is installed. With the `prometheus`
/// feature, [`InProcessPrometheus`](client_metrics::InProcessPrometheus) installs one and
/// renders the exposition text in-process.
pub mod client_metrics {
    use super::*;
    use std::time::Duration;

    use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    #[cfg(feature = "prometheus")]
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
    #[cfg(feature = "prometheus")]
    use std::sync::mpsc;
    #[cfg(feature = "prometheus")]
    use std::thread::JoinHandle;

    // Counters are exposed as `<name>_total` by the Prometheus exporter.
    pub const POINTS_WRITTEN: &str = "fluxline_points_written";
    pub const LINES_FLUSHED: &str = "fluxline_lines_flushed";
    pub const LINES_DROPPED: &str = "fluxline_lines_dropped";
    pub const TRANSMISSIONS: &str = "fluxline_transmissions";
    pub const FLUSH_DURATION_SECONDS: &str = "fluxline_flush_duration_seconds";
    pub const BUFFERED_LINES: &str = "fluxline_buffered_lines";

    /// Process-wide Prometheus recorder for the `fluxline_*` series.
    ///
    /// Applications that already expose a scrape endpoint can paste [`render`](Self::render)
    /// into it; no listener is opened here. Dropping the handle stops histogram upkeep.
    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    pub struct InProcessPrometheus {
        handle: PrometheusHandle,
        upkeep: Option<Upkeep>,
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    struct Upkeep {
        stop_tx: mpsc::Sender<()>,
        thread: JoinHandle<()>,
    }

    #[cfg(feature = "prometheus")]
    impl InProcessPrometheus {
        /// Installs the recorder and describes every client metric. Histogram buckets are
        /// rolled every `upkeep_interval` on a `fluxline-metrics-upkeep` thread.
        ///
        /// Fails with [`MetricsInitError::AlreadyInstalled`] if this process already has a
        /// global `metrics` recorder.
        pub fn install(upkeep_interval: Duration) -> Result<Self, MetricsInitError> {
            describe_all();

            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(MetricsInitError::from_build_error)?;

            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let upkeep_handle = handle.clone();
            let thread = std::thread::Builder::new()
                .name("fluxline-metrics-upkeep".to_string())
                .spawn(move || {
                    // Runs until the sender is dropped or signals.
                    while let Err(mpsc::RecvTimeoutError::Timeout) =
                        stop_rx.recv_timeout(upkeep_interval)
                    {
                        upkeep_handle.run_upkeep();
                    }
                })
                .map_err(|e| MetricsInitError::ThreadSpawn(e.to_string()))?;

            Ok(Self {
                handle,
                upkeep: Some(Upkeep { stop_tx, thread }),
            })
        }

        /// Current values of the client metrics in Prometheus text format.
        pub fn render(&self) -> String {
            self.handle.render()
        }
    }

    #[cfg(feature = "prometheus")]
    impl Drop for InProcessPrometheus {
        fn drop(&mut self) {
            if let Some(upkeep) = self.upkeep.take() {
                let _ = upkeep.stop_tx.send(());
                let _ = upkeep.thread.join();
            }
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    pub enum MetricsInitError {
        #[error("metrics recorder already installed")]
        AlreadyInstalled,
        #[error("failed to install prometheus recorder: {0}")]
        Install(String),
        #[error("failed to spawn upkeep thread: {0}")]
        ThreadSpawn(String),
    }

    #[cfg(feature = "prometheus")]
    impl MetricsInitError {
        fn from_build_error(e: BuildError) -> Self {
            match e {
                BuildError::FailedToSetGlobalRecorder(_) => MetricsInitError::AlreadyInstalled,
                other => MetricsInitError::Install(other.to_string()),
            }
        }
    }

    #[inline]
    pub fn record_points_written(points: u64) {
        if points > 0 {
            ::metrics::counter!(POINTS_WRITTEN).increment(points);
        }
    }

    #[inline]
    pub fn record_transmission(outcome: TransmissionOutcome, lines: usize, duration: Duration) {
        ::metrics::counter!(TRANSMISSIONS, "outcome" => outcome.as_str()).increment(1);
        ::metrics::histogram!(FLUSH_DURATION_SECONDS).record(duration.as_secs_f64());
        match outcome {
            TransmissionOutcome::Succeeded => {
                ::metrics::counter!(LINES_FLUSHED).increment(lines as u64)
            }
            TransmissionOutcome::BadRequest => {
                ::metrics::counter!(LINES_DROPPED).increment(lines as u64)
            }
            TransmissionOutcome::ServerError | TransmissionOutcome::ConnectionFailed => {}
        }
    }

    #[inline]
    pub fn record_buffered_lines(lines: usize) {
        ::metrics::gauge!(BUFFERED_LINES).set(lines as f64);
    }

    pub fn describe_all() {
        describe_counter!(
            POINTS_WRITTEN,
            Unit::Count,
            "Total number of points accepted by Client::write."
        );
        describe_counter!(
            LINES_FLUSHED,
            Unit::Count,
            "Total number of lines accepted by the server."
        );
        describe_counter!(
            LINES_DROPPED,
            Unit::Count,
            "Total number of lines dropped after the server rejected them as malformed."
        );
        describe_counter!(
            TRANSMISSIONS,
            Unit::Count,
            "Transmission attempts, labelled by outcome."
        );
        describe_histogram!(
            FLUSH_DURATION_SECONDS,
            Unit::Seconds,
            "Time spent in the transport for one transmission."
        );
        describe_gauge!(
            BUFFERED_LINES,
            Unit::Count,
            "Lines waiting in the batch buffer after the last flush."
        );
    }
}
