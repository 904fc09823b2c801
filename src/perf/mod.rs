//! Performance machinery: time sources, conductors and the scheduler.
//!
//! A performance is single-threaded and cooperative. The scheduler never
//! blocks: each [`Scheduler::tick`] call sends whatever falls inside the
//! look-ahead window and reports how long the host should wait before
//! calling again. Injecting a [`ManualTimeSource`] makes the whole loop
//! deterministic for tests and offline hosts.
//!
//! [`Scheduler::tick`]: Scheduler::tick

mod clock;
mod conductor;
mod scheduler;

pub use clock::{ManualClockHandle, ManualTimeSource, SentMessage, SystemTimeSource, TimeSource};
pub use conductor::{CreepConductor, TimerConductor};
pub use scheduler::{PerformanceOptions, Scheduler, Tick};

use crate::midi::Message;

/// The performance state machine: `Stopped → Running ⇄ Paused → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Running,
    Paused,
}

/// The device-level output contract. `send` must accept timestamps at or
/// slightly before "now" (the scheduler works a few ms ahead) and must
/// not block.
pub trait MessageSink {
    fn send(&mut self, bytes: &[u8], timestamp_ms: f64);
}

/// Callbacks the engine fires synchronously within the tick step that
/// causes them. All default to no-ops.
pub trait PerformanceObserver {
    /// A region other than the last finished and playback jumped onward.
    fn region_ended(&mut self, _region_index: usize) {}

    /// The performance finished or was stopped. Fired exactly once per
    /// performance, with the recording (when one was requested) and the
    /// realized wall-clock duration.
    fn performance_ended(&mut self, _recording: Option<Recording>, _realized_duration_ms: f64) {}

    /// A new score position was reached (for UI cursor sync).
    fn position_reached(&mut self, _score_position_ms: u32) {}

    /// The tick loop fell behind and sent several moments in one pass.
    /// A quality signal, never an error.
    fn tick_overload(&mut self) {}
}

/// A no-op observer for hosts that do not care about callbacks.
pub struct NullObserver;

impl PerformanceObserver for NullObserver {}

/// One message captured during a recorded performance.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMessage {
    pub timestamp_ms: f64,
    pub message: Message,
}

/// Everything sent during one recorded performance, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub messages: Vec<RecordedMessage>,
}

impl Recording {
    pub fn push(&mut self, message: Message, timestamp_ms: f64) {
        self.messages.push(RecordedMessage {
            timestamp_ms,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
