//! Progress aggregation and rate-limited reporting.
//!
//! Timing is built on [`crate::timefn`]'s monotonic-clock wrapper
//! (`TimeT`, `get_time`, `clock_span_ns`). Output is gated by a shared
//! display-level check before ever formatting a line, so a silent run
//! costs nothing per poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::timefn::{clock_span_ns, get_time, TimeT};

/// A single point-in-time progress snapshot, handed to the caller's
/// `progress_sink`.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub elapsed_ns: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub bytes_written_since_last: u64,
    pub interval_ns: u64,
}

impl Progress {
    /// Instantaneous write rate in bytes/second since the prior emission.
    pub fn rate_bytes_per_sec(&self) -> f64 {
        if self.interval_ns == 0 {
            return 0.0;
        }
        self.bytes_written_since_last as f64 / (self.interval_ns as f64 / 1_000_000_000.0)
    }
}

/// Aggregates bytes-read and bytes-written atomics and decides when to
/// emit. Polled by [`crate::extractor::extract`]'s main loop; never
/// runs on its own thread, so output is never interleaved.
pub struct ProgressReporter {
    start: TimeT,
    last_emit: TimeT,
    last_emit_bytes_written: u64,
    bytes_read: Arc<AtomicU64>,
    bytes_written_totals: Vec<Arc<AtomicU64>>,
}

impl ProgressReporter {
    pub fn new(bytes_read: Arc<AtomicU64>) -> Self {
        let now = get_time();
        ProgressReporter {
            start: now,
            last_emit: now,
            last_emit_bytes_written: 0,
            bytes_read,
            bytes_written_totals: Vec::new(),
        }
    }

    /// Registers a device writer's bytes-written counter to be summed into
    /// the aggregate total.
    pub fn track_writer(&mut self, counter: Arc<AtomicU64>) {
        self.bytes_written_totals.push(counter);
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written_totals.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Builds a snapshot unconditionally, without the once-per-second gate.
    /// Used for the final line at end-of-stream.
    pub fn snapshot(&mut self) -> Progress {
        let written = self.bytes_written();
        let now_elapsed = clock_span_ns(self.start);
        let interval_ns = clock_span_ns(self.last_emit);
        let since_last = written.saturating_sub(self.last_emit_bytes_written);
        self.last_emit = get_time();
        self.last_emit_bytes_written = written;
        Progress {
            elapsed_ns: now_elapsed,
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: written,
            bytes_written_since_last: since_last,
            interval_ns,
        }
    }

    /// Returns a snapshot only if at least one second has elapsed since the
    /// last emission; otherwise `None`.
    pub fn poll(&mut self) -> Option<Progress> {
        if clock_span_ns(self.last_emit) < 1_000_000_000 {
            return None;
        }
        Some(self.snapshot())
    }
}
