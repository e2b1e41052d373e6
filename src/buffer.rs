use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A snapshot of pending lines, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Newline-terminated lines joined into one payload.
    pub payload: String,
    /// How many buffered lines the payload covers (always a prefix of the buffer).
    pub lines: usize,
}

/// Ordered buffer of encoded lines staged for the next flush, plus the flush timing state.
///
/// The buffer is not synchronised itself; the client keeps it behind a single mutex and
/// never holds that mutex across a network send. A flush therefore works in two steps:
/// [`snapshot`](Self::snapshot) copies the pending lines out, and after the send
/// [`clear_front`](Self::clear_front) removes exactly the lines that were transmitted.
/// Lines appended in between are left alone.
#[derive(Debug)]
pub struct BatchBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    flush_interval: Duration,
    batching: bool,
    last_flush: Instant,
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchBuffer {
    /// Creates a buffer with batching disabled.
    pub fn new() -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: 0,
            flush_interval: Duration::ZERO,
            batching: false,
            last_flush: Instant::now(),
        }
    }

    /// Sets the capacity threshold and flush interval together and enables batching.
    ///
    /// A zero interval disables time-based flushing but keeps batching on.
    pub fn configure(&mut self, capacity: usize, flush_interval: Duration) {
        self.capacity = capacity;
        self.flush_interval = flush_interval;
        self.batching = true;
    }

    /// Appends a line. Returns `true` when the buffer has reached its capacity and must be
    /// flushed before the caller returns.
    pub fn append(&mut self, line: String) -> bool {
        self.lines.push_back(line);
        self.lines.len() >= self.capacity
    }

    /// Appends several lines at once. Same return value as [`append`](Self::append).
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) -> bool {
        self.lines.extend(lines);
        self.lines.len() >= self.capacity
    }

    /// Records a flush attempt and returns the pending lines as one payload, or `None` if
    /// nothing is pending.
    ///
    /// The attempt is recorded even when the buffer is empty so the scheduler waits a full
    /// interval before trying again.
    pub fn snapshot(&mut self) -> Option<Batch> {
        self.last_flush = Instant::now();
        if self.lines.is_empty() {
            return None;
        }

        let size: usize = self.lines.iter().map(|l| l.len() + 1).sum();
        let mut payload = String::with_capacity(size);
        for line in &self.lines {
            payload.push_str(line);
            payload.push('\n');
        }
        Some(Batch {
            payload,
            lines: self.lines.len(),
        })
    }

    /// Removes the first `n` lines (the ones a resolved flush transmitted).
    pub fn clear_front(&mut self, n: usize) {
        let n = n.min(self.lines.len());
        self.lines.drain(..n);
    }

    /// Time left until the next timed flush is due, or `None` if timed flushing is off.
    pub fn time_until_flush(&self) -> Option<Duration> {
        if self.flush_interval.is_zero() {
            return None;
        }
        Some(
            self.flush_interval
                .saturating_sub(self.last_flush.elapsed()),
        )
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn is_batching(&self) -> bool {
        self.batching
    }
}
