//! The envelope compiler: turns an object definition into an ordered
//! moment sequence.
//!
//! Discrete events (note-offs, switches, note-ons) arrive as moments with
//! absolute-within-object offsets. Continuous controllers arrive as sparse
//! breakpoint envelopes and are densified onto a fixed 100 ms sample grid,
//! emitting a message only where the interpolated value actually changes.
//! Both sources are then merged position by position into combined
//! moments whose internal message order is note-offs, switches,
//! controllers, note-ons.

use super::{BreakpointDef, EnvelopeDef, MomentDef, ObjectDef, ObjectKind, ScoreError};
use crate::midi::{
    Message, MidiObject, Moment, ObjectData, AFTERTOUCH, CHANNEL_PRESSURE, CONTROL_CHANGE,
    PITCH_BEND,
};
use std::collections::BTreeMap;

/// Envelope sample grid quantum in ms.
const GRID_QUANTUM_MS: u32 = 100;

/// Compiles one chord/rest definition. `track`/`object` indices are only
/// used for error context.
pub fn compile_object(
    def: &ObjectDef,
    track: usize,
    object: usize,
) -> Result<MidiObject, ScoreError> {
    if def.moments.is_empty() {
        return Err(ScoreError::EmptyObject { track, object });
    }
    let mut prev_position = None;
    for m in &def.moments {
        if prev_position.is_some_and(|p| m.position_ms <= p) {
            return Err(ScoreError::MomentsOutOfOrder { track, object });
        }
        prev_position = Some(m.position_ms);
    }
    let last = def.moments.last().expect("non-empty");
    let duration = last.position_ms + last.duration_ms;
    if duration < 1 {
        return Err(ScoreError::ZeroDurationObject { track, object });
    }

    let mut moments: BTreeMap<u32, Moment> = BTreeMap::new();
    for moment_def in &def.moments {
        let moment = moments
            .entry(moment_def.position_ms)
            .or_insert_with(|| Moment::new(moment_def.position_ms));
        fill_discrete(moment, moment_def)?;
    }

    for env in &def.envelopes {
        for (position, msg) in compile_envelope(env, duration, track, object)? {
            moments
                .entry(position)
                .or_insert_with(|| Moment::new(position))
                .push_controller(msg);
        }
    }

    let data = ObjectData::new(def.position_ms, duration, moments.into_values().collect());
    Ok(match def.kind {
        ObjectKind::Chord => MidiObject::Chord(data),
        ObjectKind::Rest => MidiObject::Rest(data),
    })
}

fn fill_discrete(moment: &mut Moment, def: &MomentDef) -> Result<(), ScoreError> {
    for m in &def.note_offs {
        moment.push_note_off(Message::new(m.status, m.data1, m.data2)?);
    }
    for m in &def.switches {
        moment.push_switch(Message::new(m.status, m.data1, m.data2)?);
    }
    for m in &def.note_ons {
        moment.push_note_on(Message::new(m.status, m.data1, m.data2)?);
    }
    Ok(())
}

/// How an envelope's breakpoint bytes map onto an interpolatable value.
enum EnvelopeShape {
    /// Fixed `data1` (controller number or aftertouch key), value in `data2`.
    Keyed { data1: u8 },
    /// Single-byte value in `data1` (channel pressure).
    SingleByte,
    /// 14-bit value split across `data1` (LSB) and `data2` (MSB).
    FourteenBit,
}

fn breakpoint_value(
    shape: &EnvelopeShape,
    bp: &BreakpointDef,
    track: usize,
    object: usize,
) -> Result<u32, ScoreError> {
    match shape {
        EnvelopeShape::Keyed { data1 } => {
            if bp.data1 != *data1 {
                return Err(ScoreError::EnvelopeMixedTargets { track, object });
            }
            let value = bp
                .data2
                .ok_or(ScoreError::EnvelopeMissingData { track, object })?;
            Ok(u32::from(value))
        }
        EnvelopeShape::SingleByte => Ok(u32::from(bp.data1)),
        EnvelopeShape::FourteenBit => {
            let msb = bp
                .data2
                .ok_or(ScoreError::EnvelopeMissingData { track, object })?;
            Ok(u32::from(bp.data1) | u32::from(msb) << 7)
        }
    }
}

fn value_to_message(status: u8, shape: &EnvelopeShape, value: u32) -> Result<Message, ScoreError> {
    let msg = match shape {
        EnvelopeShape::Keyed { data1 } => Message::new(status, *data1, Some(value as u8))?,
        EnvelopeShape::SingleByte => Message::new(status, value as u8, None)?,
        EnvelopeShape::FourteenBit => {
            Message::new(status, (value & 0x7F) as u8, Some((value >> 7) as u8))?
        }
    };
    Ok(msg)
}

/// Compiles one envelope into a position-ordered message list.
fn compile_envelope(
    env: &EnvelopeDef,
    object_duration: u32,
    track: usize,
    object: usize,
) -> Result<Vec<(u32, Message)>, ScoreError> {
    let first = env
        .breakpoints
        .first()
        .ok_or(ScoreError::EnvelopeWithoutBreakpoints { track, object })?;
    let shape = match env.status & 0xF0 {
        CONTROL_CHANGE | AFTERTOUCH => EnvelopeShape::Keyed { data1: first.data1 },
        CHANNEL_PRESSURE => EnvelopeShape::SingleByte,
        PITCH_BEND => EnvelopeShape::FourteenBit,
        status => {
            return Err(ScoreError::EnvelopeStatusUnsupported {
                track,
                object,
                status,
            })
        }
    };

    // Collapse consecutive identical values; their durations merge simply
    // by not starting a new point.
    let mut points: Vec<(u32, u32)> = Vec::with_capacity(env.breakpoints.len());
    let mut cursor = 0u32;
    for bp in &env.breakpoints {
        let value = breakpoint_value(&shape, bp, track, object)?;
        if points.last().map(|&(_, v)| v) != Some(value) {
            points.push((cursor, value));
        }
        cursor = cursor
            .checked_add(bp.duration_to_next_ms)
            .ok_or(ScoreError::EnvelopeOverrunsObject { track, object })?;
    }
    if cursor > object_duration {
        return Err(ScoreError::EnvelopeOverrunsObject { track, object });
    }

    // Sample positions: every breakpoint plus every grid point in
    // [0, object_duration). A final breakpoint landing exactly on the
    // object's end anchors the line but emits nothing itself.
    let mut positions: Vec<u32> = points
        .iter()
        .map(|&(p, _)| p)
        .filter(|&p| p < object_duration)
        .collect();
    positions.extend((1..).map(|k| k * GRID_QUANTUM_MS).take_while(|&t| t < object_duration));
    positions.sort_unstable();
    positions.dedup();

    let mut out = Vec::new();
    let mut last_emitted = None;
    for position in positions {
        let value = interpolate(&points, position);
        if last_emitted != Some(value) {
            out.push((position, value_to_message(env.status, &shape, value)?));
            last_emitted = Some(value);
        }
    }
    Ok(out)
}

/// Floor-rounded linear interpolation between the two breakpoints
/// surrounding `position`. Positions past the last breakpoint hold its
/// value.
fn interpolate(points: &[(u32, u32)], position: u32) -> u32 {
    let next = points.partition_point(|&(p, _)| p <= position);
    if next == 0 {
        return points[0].1;
    }
    let (p0, v0) = points[next - 1];
    if next == points.len() || p0 == position {
        return v0;
    }
    let (p1, v1) = points[next];
    let fraction = f64::from(position - p0) / f64::from(p1 - p0);
    (f64::from(v0) + (f64::from(v1) - f64::from(v0)) * fraction).floor() as u32
}
