//! Per-channel track playback state.
//!
//! A track owns one output channel's full ordered object sequence plus the
//! precomputed region links derived from it. During a performance the
//! scheduler owns the track exclusively and drives its cursor; between
//! performances the cursor is reset to the first region's start.

use super::{MidiObject, Moment};
use crate::score::{ControlsSnapshot, RegionLink};

/// One output channel's ordered `MidiObject` sequence, its region jump
/// table, and transient playback state.
#[derive(Debug, Clone)]
pub struct Track {
    /// MIDI channel this track performs on (0-15).
    pub channel: u8,
    /// Whether the track participates in the current performance.
    pub is_on: bool,
    /// Set by the scheduler when the track's cursor has crossed the
    /// active region's end.
    pub has_ended_region: bool,
    objects: Vec<MidiObject>,
    region_links: Vec<RegionLink>,
    current_object_index: usize,
}

impl Track {
    /// Creates a track from its compiled objects. Region links are
    /// attached separately once the score's region sequence is known.
    pub fn new(channel: u8, objects: Vec<MidiObject>) -> Self {
        Self {
            channel,
            is_on: true,
            has_ended_region: false,
            objects,
            region_links: Vec::new(),
            current_object_index: 0,
        }
    }

    pub fn set_region_links(&mut self, links: Vec<RegionLink>) {
        self.region_links = links;
    }

    pub fn objects(&self) -> &[MidiObject] {
        &self.objects
    }

    /// Absolute score position of the cursor moment, or `None` once the
    /// track is exhausted.
    pub fn current_ms_position(&self) -> Option<u32> {
        self.objects
            .get(self.current_object_index..)?
            .iter()
            .find_map(|o| o.current_moment_position_in_score())
    }

    /// The moment under the cursor, falling through exhausted objects.
    pub fn current_moment_mut(&mut self) -> Option<&mut Moment> {
        let start = self.current_object_index;
        self.objects
            .get_mut(start..)?
            .iter_mut()
            .find_map(|o| o.current_moment_mut())
    }

    /// Advances past the cursor moment, falling through to the next object
    /// when the current one is exhausted.
    ///
    /// # Panics
    ///
    /// Panics when the track is already exhausted; advancing past the end
    /// is a scheduler protocol violation.
    pub fn advance_current_moment(&mut self) {
        loop {
            let obj = self
                .objects
                .get_mut(self.current_object_index)
                .expect("advance_current_moment on an exhausted track");
            if obj.current_moment().is_some() {
                obj.advance();
                return;
            }
            // Cursor already past this object (e.g. a seek landed beyond
            // its last moment): fall through.
            self.current_object_index += 1;
        }
    }

    /// Seeks the track to `start_ms`, resets every other object to its own
    /// beginning, and pre-seeds the controls snapshot into the first
    /// performed moment at or after every region start covered by
    /// `[start_ms, end_ms)`.
    ///
    /// `region_start_positions` must be ascending and deduplicated (see
    /// [`crate::score::region_start_positions`]).
    pub fn set_output_span(&mut self, start_ms: u32, end_ms: u32, region_start_positions: &[u32]) {
        assert!(start_ms < end_ms, "empty output span {start_ms}..{end_ms}");
        self.has_ended_region = false;
        self.current_object_index = self
            .objects
            .partition_point(|o| o.end_position_in_score() <= start_ms);

        for (i, obj) in self.objects.iter_mut().enumerate() {
            if i == self.current_object_index {
                obj.seek_to_position(start_ms);
            } else {
                obj.reset_cursor();
            }
        }

        // Scan the whole span once, accumulating the running controller
        // state and replaying it into the first moment of each region.
        let starts: Vec<u32> = region_start_positions
            .iter()
            .copied()
            .filter(|&p| p >= start_ms && p < end_ms)
            .collect();
        let mut next_start = 0usize;
        let mut snapshot = ControlsSnapshot::new();
        for obj in &mut self.objects {
            let obj_position = obj.position_in_score();
            if obj_position >= end_ms {
                break;
            }
            for moment in obj.moments_mut() {
                let pos = obj_position + moment.position_in_object;
                if pos >= end_ms {
                    continue;
                }
                while next_start < starts.len() && pos >= starts[next_start] {
                    snapshot.merge_into(moment);
                    next_start += 1;
                }
                snapshot.record_moment(moment);
                moment.clear_timestamp();
            }
        }
    }

    /// Jumps the cursor to the next region's first moment using the
    /// precomputed link for the region that just ended, resetting the
    /// completed region's object cursors on the way.
    pub fn move_to_next_region(&mut self, completed_region_index: usize) {
        let link = self.region_links[completed_region_index];
        let span_end = link.first_object_index + link.object_count;
        for obj in &mut self.objects[link.first_object_index..span_end] {
            obj.reset_cursor();
        }
        match link.next_object_index {
            Some(object_index) => {
                self.objects[object_index].set_cursor(link.next_moment_index);
                self.current_object_index = object_index;
                self.has_ended_region = false;
            }
            None => {
                self.current_object_index = self.objects.len();
            }
        }
    }

    /// Tears playback state down to the start of the first region.
    pub fn reset(&mut self) {
        self.current_object_index = 0;
        self.has_ended_region = false;
        for obj in &mut self.objects {
            obj.reset_cursor();
            for moment in obj.moments_mut() {
                moment.clear_timestamp();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{Message, Moment, ObjectData};
    use crate::score::{build_region_links, RegionDef};

    /// A track of `count` chords, `duration` ms each, one note-on moment
    /// at each object start and a note-off moment halfway through.
    fn track(count: u32, duration: u32) -> Track {
        let objects = (0..count)
            .map(|i| {
                let mut on = Moment::new(0);
                on.push_note_on(Message::note_on(0, 60 + i as u8, 80).unwrap());
                let mut off = Moment::new(duration / 2);
                off.push_note_off(Message::note_off(0, 60 + i as u8, 0).unwrap());
                MidiObject::Chord(ObjectData::new(i * duration, duration, vec![on, off]))
            })
            .collect();
        Track::new(0, objects)
    }

    fn linked_track(count: u32, duration: u32, regions: &[RegionDef]) -> Track {
        let mut t = track(count, duration);
        let links = build_region_links(t.objects(), regions);
        t.set_region_links(links);
        t
    }

    #[test]
    fn test_advance_falls_through_objects() {
        let mut t = track(2, 500);
        assert_eq!(t.current_ms_position(), Some(0));
        t.advance_current_moment();
        assert_eq!(t.current_ms_position(), Some(250));
        t.advance_current_moment();
        assert_eq!(t.current_ms_position(), Some(500));
        t.advance_current_moment();
        t.advance_current_moment();
        assert_eq!(t.current_ms_position(), None);
    }

    #[test]
    fn test_set_output_span_seeks_and_resets() {
        let mut t = track(4, 500);
        // Move some cursors around first.
        t.advance_current_moment();
        t.advance_current_moment();
        t.set_output_span(750, 2000, &[0]);
        // 750 is object 1's halfway moment.
        assert_eq!(t.current_ms_position(), Some(750));
        // Later objects start from their own beginning.
        t.advance_current_moment();
        assert_eq!(t.current_ms_position(), Some(1000));
    }

    #[test]
    fn test_region_jump_matches_direct_seek() {
        let regions = vec![
            RegionDef::new("A", 0, 1000),
            RegionDef::new("B", 1000, 2000),
        ];
        // Perform region A fully, then jump via the link.
        let mut jumped = linked_track(4, 500, &regions);
        jumped.set_output_span(0, 2000, &[0, 1000]);
        while jumped.current_ms_position().is_some_and(|p| p < 1000) {
            jumped.advance_current_moment();
        }
        jumped.move_to_next_region(0);

        // Seek straight to region B's start.
        let mut sought = linked_track(4, 500, &regions);
        sought.set_output_span(1000, 2000, &[1000]);

        assert_eq!(jumped.current_ms_position(), sought.current_ms_position());
        assert_eq!(jumped.current_ms_position(), Some(1000));
    }

    #[test]
    fn test_backward_jump_replays_region() {
        let regions = vec![
            RegionDef::new("A", 0, 1000),
            RegionDef::new("A again", 0, 1000),
        ];
        let mut t = linked_track(2, 500, &regions);
        t.set_output_span(0, 1000, &[0]);
        while t.current_ms_position().is_some() {
            t.advance_current_moment();
        }
        t.move_to_next_region(0);
        assert_eq!(t.current_ms_position(), Some(0));
    }

    #[test]
    fn test_span_seeds_controls_at_region_starts() {
        // Object 0 carries a volume controller; region B starts at 1000 and
        // must receive that value even though playback enters at 1000.
        let mut on = Moment::new(0);
        on.push_controller(Message::control_change(0, 7, 42).unwrap());
        on.push_note_on(Message::note_on(0, 60, 80).unwrap());
        let mut off = Moment::new(500);
        off.push_note_off(Message::note_off(0, 60, 0).unwrap());
        let obj0 = MidiObject::Chord(ObjectData::new(0, 1000, vec![on, off]));

        let mut on1 = Moment::new(0);
        on1.push_note_on(Message::note_on(0, 62, 80).unwrap());
        let mut off1 = Moment::new(500);
        off1.push_note_off(Message::note_off(0, 62, 0).unwrap());
        let obj1 = MidiObject::Chord(ObjectData::new(1000, 1000, vec![on1, off1]));

        let mut t = Track::new(0, vec![obj0, obj1]);
        t.set_output_span(1000, 2000, &[0, 1000]);

        let first = t.current_moment_mut().expect("moment at 1000");
        let msgs: Vec<Message> = first.messages().copied().collect();
        assert_eq!(msgs[0], Message::control_change(0, 7, 42).unwrap());
        assert_eq!(msgs[1], Message::note_on(0, 62, 80).unwrap());
    }

    #[test]
    fn test_duplicate_region_starts_seed_once() {
        let mut on = Moment::new(0);
        on.push_controller(Message::control_change(0, 7, 42).unwrap());
        let obj0 = MidiObject::Rest(ObjectData::new(0, 1000, vec![on, Moment::new(500)]));
        let mut on1 = Moment::new(0);
        on1.push_note_on(Message::note_on(0, 62, 80).unwrap());
        let obj1 = MidiObject::Chord(ObjectData::new(1000, 1000, vec![on1]));

        let mut t = Track::new(0, vec![obj0, obj1]);
        // Two sequence entries sharing start position 1000.
        t.set_output_span(0, 2000, &[0, 1000, 1000]);
        while t.current_ms_position().is_some_and(|p| p < 1000) {
            t.advance_current_moment();
        }
        let moment = t.current_moment_mut().expect("moment at 1000");
        let seeded = moment
            .messages()
            .filter(|m| m.command() == crate::midi::CONTROL_CHANGE)
            .count();
        assert_eq!(seeded, 1);
    }

    #[test]
    #[should_panic(expected = "exhausted track")]
    fn test_advance_past_end_panics() {
        let mut t = track(1, 500);
        t.advance_current_moment();
        t.advance_current_moment();
        t.advance_current_moment();
    }
}
