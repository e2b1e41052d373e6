//! Background periodic flushing.
//!
//! The worker does not sleep a fixed interval. Each time it wakes it asks its target how
//! long remains until a flush is due, measured from the last flush attempt of any kind.
//! An explicit or capacity-triggered flush that happened while the worker slept pushes
//! the next timed flush back instead of causing a second flush right after it.

use crate::telemetry::{ClientEvent, ClientEventListener};

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What the flush worker drives.
pub trait FlushTarget: Send + Sync + 'static {
    /// Time left until the next flush is due. `Duration::ZERO` means flush now; `None`
    /// means timed flushing is currently disabled.
    fn time_until_flush(&self) -> Option<Duration>;

    /// Performs one flush.
    fn flush(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Commands sent to the background flush thread.
enum SchedulerCommand {
    /// Recompute the remaining wait now, e.g. after the interval changed.
    Wake,
    Stop,
}

struct Worker {
    stop_tx: mpsc::Sender<SchedulerCommand>,
    handle: JoinHandle<()>,
}

/// Owned handle to the flush worker thread.
///
/// `start` and `stop` are idempotent. `stop` waits for the thread to exit, so once it
/// returns no flush from this scheduler is running or will run. A worker that died from a
/// panic counts as stopped, and the next `start` replaces it.
pub struct FlushScheduler {
    worker: Option<Worker>,
    events: Arc<dyn ClientEventListener>,
}

impl std::fmt::Debug for FlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushScheduler")
            .field("state", &self.state())
            .finish()
    }
}

impl FlushScheduler {
    pub fn new(events: Arc<dyn ClientEventListener>) -> Self {
        Self {
            worker: None,
            events,
        }
    }

    pub fn state(&self) -> SchedulerState {
        match &self.worker {
            Some(worker) if !worker.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Spawns the worker. Does nothing if it is already running.
    pub fn start(&mut self, target: Arc<dyn FlushTarget>) -> std::io::Result<()> {
        if self.is_running() {
            return Ok(());
        }
        // Reap a worker that exited on its own.
        self.stop();

        let (stop_tx, stop_rx) = mpsc::channel::<SchedulerCommand>();
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name("fluxline-flush".to_string())
            .spawn(move || run(target, stop_rx, events))?;

        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    /// Makes a sleeping worker recompute its wait straight away. Does nothing if it is not
    /// running.
    pub fn wake(&self) {
        if let Some(worker) = &self.worker {
            let _ = worker.stop_tx.send(SchedulerCommand::Wake);
        }
    }

    /// Signals the worker and joins it. Does nothing if it is not running.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // The worker may already be gone if it panicked; joining reports that below.
        let _ = worker.stop_tx.send(SchedulerCommand::Stop);
        if worker.handle.join().is_err() {
            self.events.on_event(ClientEvent::FlushThreadPanicked);
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    target: Arc<dyn FlushTarget>,
    stop_rx: mpsc::Receiver<SchedulerCommand>,
    events: Arc<dyn ClientEventListener>,
) {
    events.on_event(ClientEvent::FlushThreadStarted);

    loop {
        // Stop check before any further sleep or flush.
        match stop_rx.try_recv() {
            Ok(SchedulerCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => break,
            Ok(SchedulerCommand::Wake) | Err(mpsc::TryRecvError::Empty) => {}
        }

        match target.time_until_flush() {
            Some(remaining) if remaining.is_zero() => target.flush(),
            Some(remaining) => match stop_rx.recv_timeout(remaining) {
                Ok(SchedulerCommand::Wake) | Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Ok(SchedulerCommand::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            },
            // Timed flushing switched off underneath us; wait until woken or stopped.
            None => match stop_rx.recv() {
                Ok(SchedulerCommand::Wake) => continue,
                Ok(SchedulerCommand::Stop) | Err(mpsc::RecvError) => break,
            },
        }
    }

    events.on_event(ClientEvent::FlushThreadStopping);
}
