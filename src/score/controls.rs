//! Running controller state for region entry.
//!
//! While a track is scanned in score order, the snapshot records the last
//! value seen for the program, pitch bend, channel pressure, each
//! aftertouch key and each controller number. Replaying the snapshot into
//! the first performed moment of a region means a jump into that region
//! never depends on what was (or was not) performed before entry.

use crate::midi::{
    Message, Moment, AFTERTOUCH, CHANNEL_PRESSURE, CONTROL_CHANGE, PITCH_BEND, PROGRAM_CHANGE,
};
use std::collections::BTreeMap;

/// Per-track "last value wins" controller/program state.
#[derive(Debug, Clone, Default)]
pub struct ControlsSnapshot {
    program: Option<Message>,
    pitch_bend: Option<Message>,
    channel_pressure: Option<Message>,
    // BTreeMaps keep the replay order deterministic.
    aftertouch: BTreeMap<u8, Message>,
    controllers: BTreeMap<u8, Message>,
}

impl ControlsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one message; later values overwrite earlier ones.
    pub fn record(&mut self, msg: &Message) {
        match msg.command() {
            PROGRAM_CHANGE => self.program = Some(*msg),
            PITCH_BEND => self.pitch_bend = Some(*msg),
            CHANNEL_PRESSURE => self.channel_pressure = Some(*msg),
            AFTERTOUCH => {
                self.aftertouch.insert(msg.data1(), *msg);
            }
            CONTROL_CHANGE => {
                self.controllers.insert(msg.data1(), *msg);
            }
            _ => {}
        }
    }

    /// Records every message of a moment, in delivery order.
    pub fn record_moment(&mut self, moment: &Moment) {
        for msg in moment.messages() {
            self.record(msg);
        }
    }

    /// The snapshot as an ordered replay list: program first, then
    /// controllers by number, pitch bend, channel pressure, aftertouch by
    /// key.
    pub fn replay_messages(&self) -> Vec<Message> {
        let mut replay = Vec::with_capacity(
            3 + self.controllers.len() + self.aftertouch.len(),
        );
        replay.extend(self.program);
        replay.extend(self.controllers.values().copied());
        replay.extend(self.pitch_bend);
        replay.extend(self.channel_pressure);
        replay.extend(self.aftertouch.values().copied());
        replay
    }

    /// Replays the snapshot into a moment without duplicating controls the
    /// moment already carries.
    pub fn merge_into(&self, moment: &mut Moment) {
        let replay = self.replay_messages();
        if !replay.is_empty() {
            moment.merge_controls(&replay);
        }
    }
}
