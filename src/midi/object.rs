//! Chords and rests: the performable units of a track.
//!
//! A `MidiObject` is a tagged variant rather than a type hierarchy; chords
//! and rests share the same structure and playback behavior, and only
//! differ in what the compiler was allowed to put inside them (a rest's
//! moments may be empty position markers).

use super::Moment;

/// The structure shared by chords and rests.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// Absolute ms position of the object's start in the score. Immune to
    /// speed scaling.
    pub position_in_score: u32,
    /// Duration in score ms (`>= 1`). Immune to speed scaling.
    pub duration_in_score: u32,
    moments: Vec<Moment>,
    /// Playback cursor. `moments.len()` means the object is exhausted.
    current_moment_index: usize,
}

impl ObjectData {
    /// Builds object data from an ordered, non-empty moment list.
    /// Emptiness and ordering are enforced by the score compiler before
    /// this is reached.
    pub fn new(position_in_score: u32, duration_in_score: u32, moments: Vec<Moment>) -> Self {
        debug_assert!(!moments.is_empty());
        debug_assert!(duration_in_score >= 1);
        Self {
            position_in_score,
            duration_in_score,
            moments,
            current_moment_index: 0,
        }
    }
}

/// A chord (pitched event) or rest, holding an ordered moment sequence.
#[derive(Debug, Clone)]
pub enum MidiObject {
    Chord(ObjectData),
    Rest(ObjectData),
}

impl MidiObject {
    fn data(&self) -> &ObjectData {
        match self {
            MidiObject::Chord(d) | MidiObject::Rest(d) => d,
        }
    }

    fn data_mut(&mut self) -> &mut ObjectData {
        match self {
            MidiObject::Chord(d) | MidiObject::Rest(d) => d,
        }
    }

    pub fn is_chord(&self) -> bool {
        matches!(self, MidiObject::Chord(_))
    }

    pub fn position_in_score(&self) -> u32 {
        self.data().position_in_score
    }

    pub fn duration_in_score(&self) -> u32 {
        self.data().duration_in_score
    }

    /// The score position one past this object's span.
    pub fn end_position_in_score(&self) -> u32 {
        let d = self.data();
        d.position_in_score + d.duration_in_score
    }

    pub fn moments(&self) -> &[Moment] {
        &self.data().moments
    }

    pub fn moments_mut(&mut self) -> &mut [Moment] {
        &mut self.data_mut().moments
    }

    /// The moment under the playback cursor, or `None` when exhausted.
    pub fn current_moment(&self) -> Option<&Moment> {
        let d = self.data();
        d.moments.get(d.current_moment_index)
    }

    pub fn current_moment_mut(&mut self) -> Option<&mut Moment> {
        let d = self.data_mut();
        d.moments.get_mut(d.current_moment_index)
    }

    /// Absolute score position of the cursor moment, or `None` when the
    /// object is exhausted.
    pub fn current_moment_position_in_score(&self) -> Option<u32> {
        let d = self.data();
        d.moments
            .get(d.current_moment_index)
            .map(|m| d.position_in_score + m.position_in_object)
    }

    /// Advances the cursor by one moment. Returns `false` once exhausted.
    pub fn advance(&mut self) -> bool {
        let d = self.data_mut();
        if d.current_moment_index < d.moments.len() {
            d.current_moment_index += 1;
        }
        d.current_moment_index < d.moments.len()
    }

    /// Resets the cursor to the object's first moment.
    pub fn reset_cursor(&mut self) {
        self.data_mut().current_moment_index = 0;
    }

    /// Places the cursor directly on a moment index (used by region jumps).
    pub fn set_cursor(&mut self, moment_index: usize) {
        let d = self.data_mut();
        debug_assert!(moment_index <= d.moments.len());
        d.current_moment_index = moment_index;
    }

    /// Seeks the cursor to the first moment at or after an absolute score
    /// position. Positions before the object land on moment 0; positions
    /// past the last moment exhaust the object.
    pub fn seek_to_position(&mut self, score_position: u32) {
        let d = self.data_mut();
        let offset = score_position.saturating_sub(d.position_in_score);
        d.current_moment_index = d
            .moments
            .partition_point(|m| m.position_in_object < offset);
    }

    /// Index of the first moment at or after an absolute score position,
    /// without moving the cursor. `None` when every moment lies before it.
    pub fn moment_index_at_or_after(&self, score_position: u32) -> Option<usize> {
        let d = self.data();
        let offset = score_position.saturating_sub(d.position_in_score);
        let idx = d.moments.partition_point(|m| m.position_in_object < offset);
        (idx < d.moments.len()).then_some(idx)
    }
}
