//! Conductor clocks: gesture-driven time sources.
//!
//! During a conducted performance the operator's pointer replaces the
//! wall clock. Score time only advances when the gesture says so, which
//! is what lets a human hold a fermata or push a phrase forward. Both
//! conductors also act as the MIDI "thru" path for a live input device,
//! forwarding performable channel messages to the output and silently
//! dropping realtime and system-exclusive traffic.

use super::{MessageSink, TimeSource};
use crate::midi::{
    AFTERTOUCH, CHANNEL_PRESSURE, CONTROL_CHANGE, NOTE_OFF, NOTE_ON, PITCH_BEND, SYSTEM_STATUS,
};
use tracing::trace;

/// Pointer distance to the right of center that doubles the timer
/// conductor's rate (and halves it to the left).
const RATE_DOUBLING_PX: f64 = 250.0;

/// Score ms advanced per pixel of pointer travel in creep mode.
const CREEP_MS_PER_PX: f64 = 8.0;

fn thru(sink: &mut dyn MessageSink, bytes: &[u8], now_ms: f64) {
    let Some(&status) = bytes.first() else {
        return;
    };
    if status >= SYSTEM_STATUS {
        trace!(status, "dropping system/realtime input");
        return;
    }
    match status & 0xF0 {
        NOTE_OFF | NOTE_ON | AFTERTOUCH | CONTROL_CHANGE | CHANNEL_PRESSURE | PITCH_BEND => {
            sink.send(bytes, now_ms);
        }
        other => trace!(command = other, "dropping unsupported input class"),
    }
}

/// "Timer" conducting: pointer-horizontal position maps logarithmically
/// to a rate multiplier applied to the wall time elapsed since the
/// previous movement. Holding still at center conducts at the chosen
/// speed; moving right accelerates, left decelerates.
pub struct TimerConductor {
    sink: Box<dyn MessageSink>,
    speed_factor: f64,
    center_x_px: f64,
    accumulated_ms: f64,
    rate: f64,
    last_wall_ms: Option<f64>,
}

impl TimerConductor {
    pub fn new(sink: Box<dyn MessageSink>, speed_factor: f64, center_x_px: f64) -> Self {
        assert!(speed_factor > 0.0, "speed factor must be positive");
        Self {
            sink,
            speed_factor,
            center_x_px,
            accumulated_ms: 0.0,
            rate: 1.0,
            last_wall_ms: None,
        }
    }

    /// Feeds one pointer movement. The interval since the previous
    /// movement is credited at the rate the pointer was at *before* this
    /// move.
    pub fn pointer_moved(&mut self, x_px: f64, wall_now_ms: f64) {
        if let Some(last) = self.last_wall_ms {
            self.accumulated_ms += (wall_now_ms - last).max(0.0) * self.rate * self.speed_factor;
        }
        self.rate = ((x_px - self.center_x_px) / RATE_DOUBLING_PX).exp2();
        self.last_wall_ms = Some(wall_now_ms);
    }

    /// MIDI thru from a live input device.
    pub fn receive_input(&mut self, bytes: &[u8]) {
        thru(self.sink.as_mut(), bytes, self.accumulated_ms);
    }
}

impl TimeSource for TimerConductor {
    fn now_ms(&self) -> f64 {
        self.accumulated_ms
    }

    fn send(&mut self, bytes: &[u8], timestamp_ms: f64) {
        self.sink.send(bytes, timestamp_ms);
    }
}

/// "Creep" conducting: pointer travel distance maps directly to elapsed
/// score time. Time stands still whenever the pointer does.
pub struct CreepConductor {
    sink: Box<dyn MessageSink>,
    speed_factor: f64,
    accumulated_ms: f64,
    last_point_px: Option<(f64, f64)>,
}

impl CreepConductor {
    pub fn new(sink: Box<dyn MessageSink>, speed_factor: f64) -> Self {
        assert!(speed_factor > 0.0, "speed factor must be positive");
        Self {
            sink,
            speed_factor,
            accumulated_ms: 0.0,
            last_point_px: None,
        }
    }

    /// Feeds one pointer movement; travel distance becomes score time.
    pub fn pointer_moved(&mut self, x_px: f64, y_px: f64) {
        if let Some((lx, ly)) = self.last_point_px {
            let distance = ((x_px - lx).powi(2) + (y_px - ly).powi(2)).sqrt();
            self.accumulated_ms += distance * CREEP_MS_PER_PX * self.speed_factor;
        }
        self.last_point_px = Some((x_px, y_px));
    }

    /// MIDI thru from a live input device.
    pub fn receive_input(&mut self, bytes: &[u8]) {
        thru(self.sink.as_mut(), bytes, self.accumulated_ms);
    }
}

impl TimeSource for CreepConductor {
    fn now_ms(&self) -> f64 {
        self.accumulated_ms
    }

    fn send(&mut self, bytes: &[u8], timestamp_ms: f64) {
        self.sink.send(bytes, timestamp_ms);
    }
}
