//! Time sources: the clocks a performance is synchronized to.
//!
//! The scheduler talks to one object that both tells the time and accepts
//! the timestamped output stream. For an unconducted performance that is
//! the host's steady clock wrapping the real output sink; for tests and
//! offline rendering it is a manually advanced clock whose output can be
//! inspected.

use super::MessageSink;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// The single contract behind every clock shape: a millisecond "now" and
/// the timestamped output path.
pub trait TimeSource {
    /// Current performance time in ms. Monotonic within one performance.
    fn now_ms(&self) -> f64;

    /// Delivers a message to the output. `timestamp_ms` may lie slightly
    /// ahead of `now_ms()` (look-ahead) and must be honored without
    /// blocking.
    fn send(&mut self, bytes: &[u8], timestamp_ms: f64);
}

/// The host's steady clock wrapping a real output sink. Time starts at 0
/// when the source is created.
pub struct SystemTimeSource {
    origin: Instant,
    sink: Box<dyn MessageSink>,
}

impl SystemTimeSource {
    pub fn new(sink: Box<dyn MessageSink>) -> Self {
        Self {
            origin: Instant::now(),
            sink,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn send(&mut self, bytes: &[u8], timestamp_ms: f64) {
        self.sink.send(bytes, timestamp_ms);
    }
}

/// One message captured by a [`ManualTimeSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub timestamp_ms: f64,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct ManualClockState {
    now_ms: f64,
    sent: Vec<SentMessage>,
}

/// A deterministic clock that only moves when told to, capturing every
/// send. Drives the scheduler in tests and offline hosts without real
/// wall-clock delays.
#[derive(Default)]
pub struct ManualTimeSource {
    state: Arc<Mutex<ManualClockState>>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle sharing this clock's state, for advancing time and
    /// inspecting output while the scheduler owns the source itself.
    pub fn handle(&self) -> ManualClockHandle {
        ManualClockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> f64 {
        self.state.lock().unwrap().now_ms
    }

    fn send(&mut self, bytes: &[u8], timestamp_ms: f64) {
        self.state.lock().unwrap().sent.push(SentMessage {
            timestamp_ms,
            bytes: bytes.to_vec(),
        });
    }
}

/// Control/inspection handle for a [`ManualTimeSource`].
#[derive(Clone)]
pub struct ManualClockHandle {
    state: Arc<Mutex<ManualClockState>>,
}

impl ManualClockHandle {
    pub fn now_ms(&self) -> f64 {
        self.state.lock().unwrap().now_ms
    }

    /// Moves the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: f64) {
        self.state.lock().unwrap().now_ms += delta_ms;
    }

    /// Drains and returns everything sent since the last call.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.state.lock().unwrap().sent)
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }
}
