//! A moment is a bundle of logically simultaneous MIDI messages.
//!
//! Messages within a moment are delivered in a fixed section order:
//! note-offs first, then switches (program changes and similar), then
//! continuous controllers, then note-ons. This guarantees that a note
//! never sounds before the controller state it depends on is in place,
//! and that re-struck pitches are released before they are re-attacked.

use super::{Message, AFTERTOUCH, CHANNEL_PRESSURE, CONTROL_CHANGE, PITCH_BEND, PROGRAM_CHANGE};

/// A position-stamped bundle of simultaneous messages.
///
/// `position_in_object` is the ms offset from the owning [`MidiObject`]'s
/// start. The absolute `timestamp_ms` stays unset until the scheduler
/// stamps the moment during a performance.
///
/// [`MidiObject`]: super::MidiObject
#[derive(Debug, Clone, Default)]
pub struct Moment {
    /// Millisecond offset from the owning object's start.
    pub position_in_object: u32,
    timestamp_ms: Option<f64>,
    note_offs: Vec<Message>,
    switches: Vec<Message>,
    controllers: Vec<Message>,
    note_ons: Vec<Message>,
}

impl Moment {
    /// Creates an empty moment at the given offset. Empty moments are
    /// legal inside rests, where they act as position markers.
    pub fn new(position_in_object: u32) -> Self {
        Self {
            position_in_object,
            ..Self::default()
        }
    }

    pub fn push_note_off(&mut self, msg: Message) {
        self.note_offs.push(msg);
    }

    pub fn push_switch(&mut self, msg: Message) {
        self.switches.push(msg);
    }

    pub fn push_controller(&mut self, msg: Message) {
        self.controllers.push(msg);
    }

    pub fn push_note_on(&mut self, msg: Message) {
        self.note_ons.push(msg);
    }

    /// All messages in delivery order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.note_offs
            .iter()
            .chain(self.switches.iter())
            .chain(self.controllers.iter())
            .chain(self.note_ons.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.note_offs.is_empty()
            && self.switches.is_empty()
            && self.controllers.is_empty()
            && self.note_ons.is_empty()
    }

    /// The absolute timestamp, if the scheduler has stamped this moment.
    pub fn timestamp_ms(&self) -> Option<f64> {
        self.timestamp_ms
    }

    pub fn set_timestamp_ms(&mut self, timestamp_ms: f64) {
        self.timestamp_ms = Some(timestamp_ms);
    }

    /// Clears the scheduling timestamp (done when a performance is torn
    /// down so the track can be reused).
    pub fn clear_timestamp(&mut self) {
        self.timestamp_ms = None;
    }

    /// Merges a controls-snapshot replay into this moment.
    ///
    /// Program changes land at the front of the switch section; everything
    /// else lands at the front of the controller section. A replayed
    /// message is dropped when the moment already carries a message for
    /// the same control, so the moment's own values always win.
    pub fn merge_controls(&mut self, replay: &[Message]) {
        for msg in replay.iter().rev() {
            match msg.command() {
                PROGRAM_CHANGE => {
                    if !self.switches.iter().any(|m| m.command() == PROGRAM_CHANGE) {
                        self.switches.insert(0, *msg);
                    }
                }
                CONTROL_CHANGE | AFTERTOUCH => {
                    // Keyed controls: duplicate only on matching data1.
                    if !self
                        .controllers
                        .iter()
                        .any(|m| m.command() == msg.command() && m.data1() == msg.data1())
                    {
                        self.controllers.insert(0, *msg);
                    }
                }
                PITCH_BEND | CHANNEL_PRESSURE => {
                    if !self.controllers.iter().any(|m| m.command() == msg.command()) {
                        self.controllers.insert(0, *msg);
                    }
                }
                _ => {}
            }
        }
    }
}
