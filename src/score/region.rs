//! Region topology: named score spans and precomputed jump targets.
//!
//! Regions let a performance repeat or skip material: the score-wide
//! region sequence is performed in order, and each entry may point
//! anywhere in score time. Jumping must be instant during a conducted
//! performance, so every (track, sequence entry) pair gets a precomputed
//! `RegionLink` at load time and region changes become O(1) cursor resets.

use crate::midi::MidiObject;
use serde::{Deserialize, Serialize};

/// A named half-open score-time span `[start, end)` in ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDef {
    pub name: String,
    pub start_ms_position: u32,
    pub end_ms_position: u32,
}

impl RegionDef {
    pub fn new(name: impl Into<String>, start_ms_position: u32, end_ms_position: u32) -> Self {
        Self {
            name: name.into(),
            start_ms_position,
            end_ms_position,
        }
    }
}

/// Precomputed jump data for one (track, region-sequence entry) pair.
///
/// `first_object_index`/`object_count` describe the objects this entry
/// spans (straddlers included) so a jump can reset their cursors; the
/// `next_*` fields are the back-filled location of the *following* entry's
/// first performed moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLink {
    pub first_object_index: usize,
    pub object_count: usize,
    pub next_object_index: Option<usize>,
    pub next_moment_index: usize,
}

/// Finds the first (object, moment) at or after a score position.
///
/// An object straddling the position counts if it still has a moment at or
/// after it; otherwise the search falls through to the next object.
/// Returns `None` when the position lies past every moment of the track.
pub fn locate(objects: &[MidiObject], score_position: u32) -> Option<(usize, usize)> {
    let start = objects.partition_point(|o| o.end_position_in_score() <= score_position);
    objects
        .iter()
        .enumerate()
        .skip(start)
        .find_map(|(i, obj)| obj.moment_index_at_or_after(score_position).map(|mi| (i, mi)))
}

/// Builds one track's region links from its ordered objects.
///
/// Objects must already be sorted by `position_in_score` (the score
/// compiler guarantees this). The sequence may revisit earlier spans, so
/// each entry is located independently by binary search.
pub fn build_region_links(objects: &[MidiObject], regions: &[RegionDef]) -> Vec<RegionLink> {
    let mut links = Vec::with_capacity(regions.len());
    for (i, region) in regions.iter().enumerate() {
        let first = objects.partition_point(|o| o.end_position_in_score() <= region.start_ms_position);
        let end_index = objects.partition_point(|o| o.position_in_score() < region.end_ms_position);
        let (next_object_index, next_moment_index) = match regions.get(i + 1) {
            Some(next) => match locate(objects, next.start_ms_position) {
                Some((oi, mi)) => (Some(oi), mi),
                None => (None, 0),
            },
            None => (None, 0),
        };
        links.push(RegionLink {
            first_object_index: first,
            object_count: end_index.saturating_sub(first),
            next_object_index,
            next_moment_index,
        });
    }
    links
}

/// Distinct region start positions in ascending order. Sequence entries
/// sharing a start position collapse to a single entry.
pub fn region_start_positions(regions: &[RegionDef]) -> Vec<u32> {
    let mut starts: Vec<u32> = regions.iter().map(|r| r.start_ms_position).collect();
    starts.sort_unstable();
    starts.dedup();
    starts
}
