//! maestro - a real-time MIDI score performance engine.
//!
//! This library turns a score (tracks of timed chords and rests, plus an
//! ordered region sequence) into a precisely timed stream of MIDI
//! messages. The host supplies a clock and an output sink; the engine
//! supplies look-ahead scheduling, region jumps, pause/resume, speed
//! scaling and gesture-driven "conductor" clocks.

pub mod midi;
pub mod perf;
pub mod score;

// Re-export commonly used types
pub use midi::{Message, MessageError, MidiObject, Moment, Track};
pub use perf::{
    CreepConductor, ManualTimeSource, MessageSink, NullObserver, PerformanceObserver,
    PerformanceOptions, Recording, Scheduler, SystemTimeSource, Tick, TimeSource, TimerConductor,
};
pub use score::{RegionDef, Score, ScoreError};
