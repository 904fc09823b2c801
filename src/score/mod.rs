//! Score source model and load-time compilation.
//!
//! A score arrives from the loading collaborator as plain data: per-track
//! object definitions (discrete moments plus continuous-controller
//! envelopes) and an ordered region sequence. Compilation validates
//! everything up front — a malformed score aborts loading, never the
//! engine — and produces the [`Track`]s and [`RegionDef`]s a performance
//! consumes.

mod controls;
mod envelope;
mod region;

pub use controls::ControlsSnapshot;
pub use envelope::compile_object;
pub use region::{build_region_links, locate, region_start_positions, RegionDef, RegionLink};

use crate::midi::{MessageError, Track};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while compiling a score from source data. All of these
/// are fatal for the score being loaded.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("invalid score JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Message(#[from] MessageError),
    #[error("score defines no tracks")]
    NoTracks,
    #[error("track {track}, object {object}: no discrete moments")]
    EmptyObject { track: usize, object: usize },
    #[error("track {track}, object {object}: zero duration")]
    ZeroDurationObject { track: usize, object: usize },
    #[error("track {track}, object {object}: moment positions not strictly ascending")]
    MomentsOutOfOrder { track: usize, object: usize },
    #[error("track {track}: object positions overlap or run backwards")]
    ObjectsOutOfOrder { track: usize },
    #[error("track {track}, object {object}: envelope has no breakpoints")]
    EnvelopeWithoutBreakpoints { track: usize, object: usize },
    #[error("track {track}, object {object}: status 0x{status:02X} cannot carry an envelope")]
    EnvelopeStatusUnsupported { track: usize, object: usize, status: u8 },
    #[error("track {track}, object {object}: envelope breakpoint is missing a data byte")]
    EnvelopeMissingData { track: usize, object: usize },
    #[error("track {track}, object {object}: envelope changes controller/key mid-flight")]
    EnvelopeMixedTargets { track: usize, object: usize },
    #[error("track {track}, object {object}: envelope runs past the object's end")]
    EnvelopeOverrunsObject { track: usize, object: usize },
    #[error("region {name:?} has an empty span")]
    RegionSpanEmpty { name: String },
    #[error("first region must start at position 0")]
    FirstRegionNotAtZero,
    #[error("region {name:?} extends past the end of the score")]
    RegionBeyondScore { name: String },
}

/// A raw message in score source data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDef {
    pub status: u8,
    pub data1: u8,
    #[serde(default)]
    pub data2: Option<u8>,
}

/// One discrete moment of an object: an offset plus the three message
/// groups the compiler keeps apart (note-offs, switches, note-ons).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentDef {
    pub position_ms: u32,
    pub duration_ms: u32,
    #[serde(default)]
    pub note_offs: Vec<MessageDef>,
    #[serde(default)]
    pub switches: Vec<MessageDef>,
    #[serde(default)]
    pub note_ons: Vec<MessageDef>,
}

/// One breakpoint of a continuous-controller envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakpointDef {
    pub data1: u8,
    #[serde(default)]
    pub data2: Option<u8>,
    pub duration_to_next_ms: u32,
}

/// A sparse continuous-controller envelope: a status byte plus ordered
/// breakpoints. The compiler densifies it onto a fixed sample grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeDef {
    pub status: u8,
    pub breakpoints: Vec<BreakpointDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Chord,
    Rest,
}

/// A chord or rest definition before compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub kind: ObjectKind,
    pub position_ms: u32,
    pub moments: Vec<MomentDef>,
    #[serde(default)]
    pub envelopes: Vec<EnvelopeDef>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDef {
    pub channel: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub objects: Vec<ObjectDef>,
}

/// A whole score as delivered by the loading collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDef {
    pub tracks: Vec<TrackDef>,
    /// Ordered region sequence. Empty means one whole-score region.
    #[serde(default)]
    pub regions: Vec<RegionDef>,
}

/// A compiled, performable score.
#[derive(Debug, Clone)]
pub struct Score {
    pub tracks: Vec<Track>,
    pub regions: Vec<RegionDef>,
}

impl Score {
    /// Parses and compiles a JSON score.
    pub fn from_json(json: &str) -> Result<Self, ScoreError> {
        let def: ScoreDef = serde_json::from_str(json)?;
        Self::compile(&def)
    }

    /// Compiles score source data into tracks with region links attached.
    pub fn compile(def: &ScoreDef) -> Result<Self, ScoreError> {
        if def.tracks.is_empty() {
            return Err(ScoreError::NoTracks);
        }

        let mut tracks = Vec::with_capacity(def.tracks.len());
        let mut score_end = 0u32;
        for (track_index, track_def) in def.tracks.iter().enumerate() {
            let mut objects = Vec::with_capacity(track_def.objects.len());
            let mut prev_end = 0u32;
            for (object_index, object_def) in track_def.objects.iter().enumerate() {
                let object = compile_object(object_def, track_index, object_index)?;
                if object.position_in_score() < prev_end {
                    return Err(ScoreError::ObjectsOutOfOrder { track: track_index });
                }
                prev_end = object.end_position_in_score();
                objects.push(object);
            }
            score_end = score_end.max(prev_end);
            let mut track = Track::new(track_def.channel, objects);
            track.is_on = track_def.enabled;
            tracks.push(track);
        }

        let regions = if def.regions.is_empty() {
            vec![RegionDef::new("score", 0, score_end)]
        } else {
            def.regions.clone()
        };
        if regions[0].start_ms_position != 0 {
            return Err(ScoreError::FirstRegionNotAtZero);
        }
        for r in &regions {
            if r.start_ms_position >= r.end_ms_position {
                return Err(ScoreError::RegionSpanEmpty {
                    name: r.name.clone(),
                });
            }
            if r.end_ms_position > score_end {
                return Err(ScoreError::RegionBeyondScore {
                    name: r.name.clone(),
                });
            }
        }

        for track in &mut tracks {
            let links = build_region_links(track.objects(), &regions);
            track.set_region_links(links);
        }

        Ok(Self { tracks, regions })
    }

    /// The score's end position: the latest object end across all tracks.
    pub fn end_ms_position(&self) -> u32 {
        self.tracks
            .iter()
            .filter_map(|t| t.objects().last().map(|o| o.end_position_in_score()))
            .max()
            .unwrap_or(0)
    }
}
