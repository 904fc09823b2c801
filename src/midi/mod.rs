//! MIDI data structures for a compiled, performable score.
//!
//! This module provides the core types for representing short MIDI messages,
//! time-ordered message bundles (moments), chords/rests, and per-channel
//! tracks. Everything here is built once per loaded score and then owned by
//! a single performance at a time.

mod message;
mod moment;
mod object;
mod track;

pub use message::{Message, MessageError};
pub use moment::Moment;
pub use object::{MidiObject, ObjectData};
pub use track::Track;

/// Note-off command nibble.
pub const NOTE_OFF: u8 = 0x80;
/// Note-on command nibble.
pub const NOTE_ON: u8 = 0x90;
/// Polyphonic (per-key) aftertouch command nibble.
pub const AFTERTOUCH: u8 = 0xA0;
/// Control change command nibble.
pub const CONTROL_CHANGE: u8 = 0xB0;
/// Program change command nibble.
pub const PROGRAM_CHANGE: u8 = 0xC0;
/// Channel pressure command nibble.
pub const CHANNEL_PRESSURE: u8 = 0xD0;
/// Pitch bend command nibble.
pub const PITCH_BEND: u8 = 0xE0;
/// First system status byte. Statuses at or above this value never appear
/// in a compiled score.
pub const SYSTEM_STATUS: u8 = 0xF0;

/// The All Sound Off controller number. Sent on every performed channel
/// when a performance stops so no note is left hanging.
pub const CC_ALL_SOUND_OFF: u8 = 120;

/// Returns the number of data bytes implied by a channel status byte.
///
/// Program change and channel pressure carry one data byte; every other
/// channel command carries two. The caller must pass a channel status
/// (`0x80..=0xEF`).
#[inline]
pub fn data_len(status: u8) -> usize {
    match status & 0xF0 {
        PROGRAM_CHANGE | CHANNEL_PRESSURE => 1,
        _ => 2,
    }
}
