//! Short MIDI message representation.
//!
//! A message is an immutable status byte plus one or two data bytes. The
//! length is fully determined by the status byte, and out-of-range bytes
//! are rejected at construction so a compiled score can never contain a
//! malformed message.

use super::{
    data_len, AFTERTOUCH, CHANNEL_PRESSURE, CONTROL_CHANGE, NOTE_OFF, NOTE_ON, PITCH_BEND,
    PROGRAM_CHANGE, SYSTEM_STATUS,
};
use thiserror::Error;

/// Errors raised when constructing a [`Message`] from raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("status byte 0x{0:02X} is not a channel status (expected 0x80..=0xEF)")]
    InvalidStatus(u8),
    #[error("data byte 0x{0:02X} out of range (expected 0x00..=0x7F)")]
    DataByteOutOfRange(u8),
    #[error("status 0x{status:02X} requires {expected} data byte(s)")]
    WrongDataCount { status: u8, expected: usize },
    #[error("channel {0} out of range (expected 0..=15)")]
    ChannelOutOfRange(u8),
}

/// An immutable short MIDI channel message (status byte + 1-2 data bytes).
///
/// Construction validates every byte, so accessors never need to re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    bytes: [u8; 3],
    len: u8,
}

impl Message {
    /// Builds a message from a status byte and its data bytes.
    ///
    /// `data2` must be `Some` exactly when the status requires two data
    /// bytes (see [`data_len`]).
    pub fn new(status: u8, data1: u8, data2: Option<u8>) -> Result<Self, MessageError> {
        if !(NOTE_OFF..SYSTEM_STATUS).contains(&status) {
            return Err(MessageError::InvalidStatus(status));
        }
        let expected = data_len(status);
        let given = 1 + usize::from(data2.is_some());
        if given != expected {
            return Err(MessageError::WrongDataCount { status, expected });
        }
        if data1 > 0x7F {
            return Err(MessageError::DataByteOutOfRange(data1));
        }
        if let Some(d2) = data2 {
            if d2 > 0x7F {
                return Err(MessageError::DataByteOutOfRange(d2));
            }
        }
        Ok(Self {
            bytes: [status, data1, data2.unwrap_or(0)],
            len: 1 + expected as u8,
        })
    }

    /// Note-on. A velocity of 0 is a valid (note-off-equivalent) message.
    pub fn note_on(channel: u8, pitch: u8, velocity: u8) -> Result<Self, MessageError> {
        Self::channel_message(NOTE_ON, channel, pitch, Some(velocity))
    }

    /// Note-off with release velocity.
    pub fn note_off(channel: u8, pitch: u8, velocity: u8) -> Result<Self, MessageError> {
        Self::channel_message(NOTE_OFF, channel, pitch, Some(velocity))
    }

    /// Control change (continuous controller).
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Result<Self, MessageError> {
        Self::channel_message(CONTROL_CHANGE, channel, controller, Some(value))
    }

    /// Program (patch) change.
    pub fn program_change(channel: u8, program: u8) -> Result<Self, MessageError> {
        Self::channel_message(PROGRAM_CHANGE, channel, program, None)
    }

    /// Pitch bend from a 14-bit value (0..=16383, 8192 = center).
    pub fn pitch_bend(channel: u8, value: u16) -> Result<Self, MessageError> {
        if value > 0x3FFF {
            return Err(MessageError::DataByteOutOfRange((value >> 7) as u8));
        }
        Self::channel_message(
            PITCH_BEND,
            channel,
            (value & 0x7F) as u8,
            Some((value >> 7) as u8),
        )
    }

    /// Channel pressure (monophonic aftertouch).
    pub fn channel_pressure(channel: u8, pressure: u8) -> Result<Self, MessageError> {
        Self::channel_message(CHANNEL_PRESSURE, channel, pressure, None)
    }

    /// Polyphonic aftertouch for one key.
    pub fn aftertouch(channel: u8, key: u8, pressure: u8) -> Result<Self, MessageError> {
        Self::channel_message(AFTERTOUCH, channel, key, Some(pressure))
    }

    fn channel_message(
        command: u8,
        channel: u8,
        data1: u8,
        data2: Option<u8>,
    ) -> Result<Self, MessageError> {
        if channel > 0x0F {
            return Err(MessageError::ChannelOutOfRange(channel));
        }
        Self::new(command | channel, data1, data2)
    }

    /// The raw status byte (command nibble | channel nibble).
    #[inline]
    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// The command class (high nibble of the status byte).
    #[inline]
    pub fn command(&self) -> u8 {
        self.bytes[0] & 0xF0
    }

    /// The channel (low nibble of the status byte).
    #[inline]
    pub fn channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    /// The first data byte.
    #[inline]
    pub fn data1(&self) -> u8 {
        self.bytes[1]
    }

    /// The second data byte, or 0 for one-data-byte commands.
    #[inline]
    pub fn data2(&self) -> u8 {
        self.bytes[2]
    }

    /// The message as a wire-ready byte slice (length 2 or 3).
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}
