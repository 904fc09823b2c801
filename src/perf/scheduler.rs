//! The cooperative look-ahead scheduler.
//!
//! One `Scheduler` owns the score's tracks for the duration of a
//! performance and drives them from a [`TimeSource`]. Nothing here ever
//! blocks: `tick` sends whatever falls inside a small look-ahead window
//! and tells the host how long to wait before the next call. Falling
//! behind causes a tight catch-up pass (reported once as a tick
//! overload), never dropped messages.

use super::{PerformanceObserver, PlaybackState, Recording, TimeSource};
use crate::midi::{Message, Track, CC_ALL_SOUND_OFF};
use crate::score::{region_start_positions, RegionDef, Score};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How far ahead of "now" a moment may be sent to the output sink.
const LOOKAHEAD_MS: f64 = 3.0;

/// How long the host may stay hidden before the performance is stopped
/// rather than left to drift.
const HIDDEN_STOP_DELAY_MS: f64 = 2000.0;

/// What the host should do after a [`Scheduler::tick`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Call `tick` again after roughly this many ms.
    Wait(f64),
    /// Nothing to do: the scheduler is stopped or paused. Already-queued
    /// wake-ups landing here are harmless no-ops.
    Idle,
    /// The performance just ended.
    Done,
}

/// Parameters for one performance.
#[derive(Debug, Clone)]
pub struct PerformanceOptions {
    /// One flag per track; disabled tracks are skipped entirely.
    pub enabled_tracks: Vec<bool>,
    pub start_region_index: usize,
    pub start_ms_position: u32,
    pub end_region_index: usize,
    /// End position inside the end region (caps its span).
    pub end_ms_position: u32,
    /// Time scale: 2.0 plays the remaining span twice as fast.
    pub speed_factor: f64,
    /// Capture everything sent and hand it to `performance_ended`.
    pub record: bool,
}

impl PerformanceOptions {
    /// Plays every track through the whole region sequence at speed 1.
    pub fn whole_score(score: &Score) -> Self {
        let last = score.regions.len() - 1;
        Self {
            enabled_tracks: vec![true; score.tracks.len()],
            start_region_index: 0,
            start_ms_position: score.regions[0].start_ms_position,
            end_region_index: last,
            end_ms_position: score.regions[last].end_ms_position,
            speed_factor: 1.0,
            record: false,
        }
    }
}

/// A moment pulled from the tracks and stamped, waiting for its time.
struct PendingMoment {
    timestamp_ms: f64,
    score_position: u32,
    messages: Vec<Message>,
    /// Region index to report once this moment is delivered.
    region_ended: Option<usize>,
    /// Delivering this moment ends the performance.
    is_final: bool,
}

/// The scheduling and timing engine for one score.
///
/// Constructed per loaded score; tracks are owned exclusively and reset
/// to the first region's start after every performance, so the scheduler
/// is reusable for consecutive performances.
pub struct Scheduler {
    tracks: Vec<Track>,
    regions: Vec<RegionDef>,
    region_starts: Vec<u32>,
    time_source: Box<dyn TimeSource>,
    observer: Box<dyn PerformanceObserver>,
    state: PlaybackState,
    speed_factor: f64,
    current_region_index: usize,
    end_region_index: usize,
    end_ms_position: u32,
    start_time_ms: f64,
    prev_timestamp_ms: f64,
    prev_score_position: u32,
    last_reported_position: Option<u32>,
    pending: Option<PendingMoment>,
    pause_started_ms: Option<f64>,
    recording: Option<Recording>,
    hidden_since_ms: Option<f64>,
}

impl Scheduler {
    pub fn new(
        score: Score,
        time_source: Box<dyn TimeSource>,
        observer: Box<dyn PerformanceObserver>,
    ) -> Self {
        let region_starts = region_start_positions(&score.regions);
        Self {
            tracks: score.tracks,
            regions: score.regions,
            region_starts,
            time_source,
            observer,
            state: PlaybackState::Stopped,
            speed_factor: 1.0,
            current_region_index: 0,
            end_region_index: 0,
            end_ms_position: 0,
            start_time_ms: 0.0,
            prev_timestamp_ms: 0.0,
            prev_score_position: 0,
            last_reported_position: None,
            pending: None,
            pause_started_ms: None,
            recording: None,
            hidden_since_ms: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PlaybackState::Stopped
    }

    /// Replaces the clock/output pair. Only legal between performances.
    pub fn set_time_source(&mut self, time_source: Box<dyn TimeSource>) {
        assert!(
            self.is_stopped(),
            "set_time_source() during a performance"
        );
        self.time_source = time_source;
    }

    /// Changes the speed factor. Affects only the not-yet-scheduled
    /// remainder of the performance.
    pub fn set_speed(&mut self, speed_factor: f64) {
        assert!(speed_factor > 0.0, "speed factor must be positive");
        self.speed_factor = speed_factor;
    }

    /// Tells the scheduler whether the hosting page/tab is visible.
    /// Staying hidden for more than a short grace period stops the
    /// performance in an orderly way instead of letting it drift.
    pub fn set_host_visible(&mut self, visible: bool) {
        if visible {
            self.hidden_since_ms = None;
        } else if self.hidden_since_ms.is_none() {
            self.hidden_since_ms = Some(self.time_source.now_ms());
        }
    }

    /// Starts a performance over `[start, end)` of the region sequence.
    ///
    /// # Panics
    ///
    /// Panics on caller protocol violations: playing while not stopped,
    /// a mask of the wrong length or with no enabled track, a
    /// non-positive speed factor, or an inconsistent span.
    pub fn play(&mut self, options: PerformanceOptions) {
        assert!(self.is_stopped(), "play() while a performance is in progress");
        assert_eq!(
            options.enabled_tracks.len(),
            self.tracks.len(),
            "enabled-track mask length mismatch"
        );
        assert!(
            options.enabled_tracks.iter().any(|&on| on),
            "no tracks enabled"
        );
        assert!(options.speed_factor > 0.0, "speed factor must be positive");
        assert!(
            options.start_region_index <= options.end_region_index
                && options.end_region_index < self.regions.len(),
            "region span out of range"
        );
        assert!(
            options.start_ms_position < options.end_ms_position,
            "empty performance span"
        );

        for (track, &on) in self.tracks.iter_mut().zip(&options.enabled_tracks) {
            track.is_on = on;
            if on {
                track.set_output_span(
                    options.start_ms_position,
                    options.end_ms_position,
                    &self.region_starts,
                );
            }
        }

        let now = self.time_source.now_ms();
        self.state = PlaybackState::Running;
        self.speed_factor = options.speed_factor;
        self.current_region_index = options.start_region_index;
        self.end_region_index = options.end_region_index;
        self.end_ms_position = options.end_ms_position;
        self.start_time_ms = now;
        self.prev_timestamp_ms = now;
        self.prev_score_position = options.start_ms_position;
        self.last_reported_position = None;
        self.pending = None;
        self.pause_started_ms = None;
        self.recording = options.record.then(Recording::default);
        info!(
            start_region = options.start_region_index,
            end_region = options.end_region_index,
            speed = options.speed_factor,
            "performance started"
        );
    }

    /// Pauses a running performance.
    ///
    /// # Panics
    ///
    /// Panics when the scheduler is not running.
    pub fn pause(&mut self) {
        assert!(self.is_running(), "pause() while not running");
        self.pause_started_ms = Some(self.time_source.now_ms());
        self.state = PlaybackState::Paused;
        debug!("performance paused");
    }

    /// Resumes a paused performance. Every future timestamp shifts
    /// uniformly by the pause duration; nothing is discarded or
    /// reordered.
    ///
    /// # Panics
    ///
    /// Panics when the scheduler is not paused.
    pub fn resume(&mut self) {
        assert!(self.is_paused(), "resume() while not paused");
        let started = self
            .pause_started_ms
            .take()
            .expect("paused without a captured pause instant");
        let pause_duration = self.time_source.now_ms() - started;
        self.prev_timestamp_ms += pause_duration;
        self.start_time_ms += pause_duration;
        if let Some(pending) = &mut self.pending {
            pending.timestamp_ms += pause_duration;
        }
        self.state = PlaybackState::Running;
        debug!(pause_duration_ms = pause_duration, "performance resumed");
    }

    /// Stops the performance. Idempotent: the `performance_ended`
    /// callback fires exactly once per performance.
    pub fn stop(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.pending = None;
        let now = self.time_source.now_ms();
        // An open pause is excluded from the realized duration, exactly as
        // a resumed one would have been.
        if let Some(started) = self.pause_started_ms.take() {
            self.start_time_ms += now - started;
        }
        self.finish(now);
    }

    /// One cooperative scheduling step.
    ///
    /// Sends every moment whose timestamp falls within the look-ahead
    /// window and returns how long the host should wait before calling
    /// again. Calling this on a stopped scheduler is a no-op; on a paused
    /// one only the hidden-host check runs.
    pub fn tick(&mut self) -> Tick {
        if self.is_stopped() {
            return Tick::Idle;
        }
        let now = self.time_source.now_ms();
        if let Some(hidden_since) = self.hidden_since_ms {
            if now - hidden_since >= HIDDEN_STOP_DELAY_MS {
                warn!("host hidden too long; stopping performance");
                self.pending = None;
                if let Some(started) = self.pause_started_ms.take() {
                    self.start_time_ms += now - started;
                }
                self.finish(now);
                return Tick::Done;
            }
        }
        if self.is_paused() {
            return Tick::Idle;
        }

        let mut sent_behind = 0u32;
        loop {
            if self.pending.is_none() {
                self.pending = Some(self.next_moment());
            }
            let due = {
                let pending = self.pending.as_ref().expect("pending moment");
                pending.timestamp_ms <= now + LOOKAHEAD_MS
            };
            if !due {
                if sent_behind > 1 {
                    warn!(moments = sent_behind, "tick overload");
                    self.observer.tick_overload();
                }
                let pending = self.pending.as_ref().expect("pending moment");
                return Tick::Wait(pending.timestamp_ms - now);
            }

            let pending = self.pending.take().expect("pending moment");
            if pending.timestamp_ms < now {
                sent_behind += 1;
            }
            for msg in &pending.messages {
                self.time_source.send(msg.bytes(), pending.timestamp_ms);
                if let Some(recording) = &mut self.recording {
                    recording.push(*msg, pending.timestamp_ms);
                }
            }
            if self.last_reported_position != Some(pending.score_position) {
                self.last_reported_position = Some(pending.score_position);
                self.observer.position_reached(pending.score_position);
            }
            if let Some(region_index) = pending.region_ended {
                self.observer.region_ended(region_index);
            }
            if pending.is_final {
                if sent_behind > 1 {
                    self.observer.tick_overload();
                }
                self.finish(now.max(pending.timestamp_ms));
                return Tick::Done;
            }
        }
    }

    /// Drives the tick loop with real sleeps until the performance ends
    /// or is paused. For hosts without their own timer.
    pub fn run_blocking(&mut self) {
        loop {
            match self.tick() {
                Tick::Wait(delay_ms) => {
                    std::thread::sleep(Duration::from_secs_f64(delay_ms.max(0.0) / 1000.0));
                }
                Tick::Idle | Tick::Done => return,
            }
        }
    }

    /// The active region's effective end position.
    fn region_end(&self, region_index: usize) -> u32 {
        if region_index == self.end_region_index {
            self.end_ms_position
        } else {
            self.regions[region_index].end_ms_position
        }
    }

    /// Picks the next moment to schedule: the enabled, not-region-ended
    /// track whose cursor has the smallest score position. When every
    /// enabled track has reached the active region's end, either jumps to
    /// the next region (producing a zero-message moment that keeps the
    /// timeline continuous across the boundary) or produces the final
    /// moment of the performance.
    fn next_moment(&mut self) -> PendingMoment {
        let region_end = self.region_end(self.current_region_index);
        let mut best: Option<(usize, u32)> = None;
        for (i, track) in self.tracks.iter_mut().enumerate() {
            if !track.is_on {
                continue;
            }
            match track.current_ms_position() {
                Some(pos) if pos < region_end => {
                    track.has_ended_region = false;
                    if best.map_or(true, |(_, best_pos)| pos < best_pos) {
                        best = Some((i, pos));
                    }
                }
                _ => track.has_ended_region = true,
            }
        }

        match best {
            Some((track_index, pos)) => {
                let delta = pos.saturating_sub(self.prev_score_position);
                let timestamp = self.prev_timestamp_ms + f64::from(delta) / self.speed_factor;
                let track = &mut self.tracks[track_index];
                let moment = track
                    .current_moment_mut()
                    .expect("track cursor lost its moment");
                moment.set_timestamp_ms(timestamp);
                let messages: Vec<Message> = moment.messages().copied().collect();
                track.advance_current_moment();
                self.prev_timestamp_ms = timestamp;
                self.prev_score_position = pos;
                PendingMoment {
                    timestamp_ms: timestamp,
                    score_position: pos,
                    messages,
                    region_ended: None,
                    is_final: false,
                }
            }
            None => {
                // The active region's remaining span keeps the timeline
                // continuous across the boundary.
                let remaining = region_end.saturating_sub(self.prev_score_position);
                let timestamp = self.prev_timestamp_ms + f64::from(remaining) / self.speed_factor;
                let completed = self.current_region_index;
                if completed >= self.end_region_index {
                    self.prev_timestamp_ms = timestamp;
                    self.prev_score_position = region_end;
                    return PendingMoment {
                        timestamp_ms: timestamp,
                        score_position: region_end,
                        messages: Vec::new(),
                        region_ended: None,
                        is_final: true,
                    };
                }
                for track in self.tracks.iter_mut().filter(|t| t.is_on) {
                    track.move_to_next_region(completed);
                }
                self.current_region_index = completed + 1;
                let next_start = self.regions[self.current_region_index].start_ms_position;
                self.prev_timestamp_ms = timestamp;
                self.prev_score_position = next_start;
                debug!(
                    completed_region = completed,
                    next_region = self.current_region_index,
                    "region boundary crossed"
                );
                PendingMoment {
                    timestamp_ms: timestamp,
                    score_position: next_start,
                    messages: Vec::new(),
                    region_ended: Some(completed),
                    is_final: false,
                }
            }
        }
    }

    /// Ends the performance: flushes hanging notes, resets every track to
    /// the first region's start, and reports the realized duration.
    fn finish(&mut self, now: f64) {
        let flush_at = now.max(self.prev_timestamp_ms);
        let mut flushed: Vec<u8> = Vec::new();
        for track in self.tracks.iter().filter(|t| t.is_on) {
            if flushed.contains(&track.channel) {
                continue;
            }
            flushed.push(track.channel);
            let msg = Message::control_change(track.channel, CC_ALL_SOUND_OFF, 0)
                .expect("all-sound-off is always valid");
            self.time_source.send(msg.bytes(), flush_at);
        }
        for track in &mut self.tracks {
            track.reset();
        }
        self.state = PlaybackState::Stopped;
        self.hidden_since_ms = None;
        let realized = now - self.start_time_ms;
        let recording = self.recording.take();
        info!(realized_duration_ms = realized, "performance ended");
        self.observer.performance_ended(recording, realized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf::{ManualClockHandle, ManualTimeSource};
    use crate::score::{MessageDef, MomentDef, ObjectDef, ObjectKind, ScoreDef, TrackDef};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        regions_ended: Vec<usize>,
        endings: Vec<(Option<usize>, f64)>,
        positions: Vec<u32>,
        overloads: u32,
    }

    #[derive(Clone, Default)]
    struct TestObserver {
        log: Arc<Mutex<Log>>,
    }

    impl PerformanceObserver for TestObserver {
        fn region_ended(&mut self, region_index: usize) {
            self.log.lock().unwrap().regions_ended.push(region_index);
        }

        fn performance_ended(&mut self, recording: Option<Recording>, realized_ms: f64) {
            self.log
                .lock()
                .unwrap()
                .endings
                .push((recording.map(|r| r.len()), realized_ms));
        }

        fn position_reached(&mut self, score_position_ms: u32) {
            self.log.lock().unwrap().positions.push(score_position_ms);
        }

        fn tick_overload(&mut self) {
            self.log.lock().unwrap().overloads += 1;
        }
    }

    fn chord(position_ms: u32, pitch: u8, channel: u8) -> ObjectDef {
        ObjectDef {
            kind: ObjectKind::Chord,
            position_ms,
            moments: vec![
                MomentDef {
                    position_ms: 0,
                    duration_ms: 250,
                    note_offs: vec![],
                    switches: vec![],
                    note_ons: vec![MessageDef {
                        status: 0x90 | channel,
                        data1: pitch,
                        data2: Some(80),
                    }],
                },
                MomentDef {
                    position_ms: 250,
                    duration_ms: 250,
                    note_offs: vec![MessageDef {
                        status: 0x80 | channel,
                        data1: pitch,
                        data2: Some(0),
                    }],
                    switches: vec![],
                    note_ons: vec![],
                },
            ],
            envelopes: vec![],
        }
    }

    fn track_def(channel: u8, base_pitch: u8) -> TrackDef {
        TrackDef {
            channel,
            enabled: true,
            objects: (0..4u32)
                .map(|i| chord(i * 500, base_pitch + 2 * i as u8, channel))
                .collect(),
        }
    }

    /// Two tracks, four 500 ms chords each, split into two regions.
    fn two_region_score() -> Score {
        Score::compile(&ScoreDef {
            tracks: vec![track_def(0, 60), track_def(1, 70)],
            regions: vec![
                RegionDef::new("first half", 0, 1000),
                RegionDef::new("second half", 1000, 2000),
            ],
        })
        .unwrap()
    }

    fn one_track_score() -> Score {
        Score::compile(&ScoreDef {
            tracks: vec![track_def(0, 60)],
            regions: vec![],
        })
        .unwrap()
    }

    fn setup(score: Score) -> (Scheduler, ManualClockHandle, Arc<Mutex<Log>>) {
        let source = ManualTimeSource::new();
        let handle = source.handle();
        let observer = TestObserver::default();
        let log = Arc::clone(&observer.log);
        let scheduler = Scheduler::new(score, Box::new(source), Box::new(observer));
        (scheduler, handle, log)
    }

    /// Ticks the scheduler to completion, advancing the manual clock by
    /// exactly the requested wait each time.
    fn drive(scheduler: &mut Scheduler, handle: &ManualClockHandle) {
        for _ in 0..10_000 {
            match scheduler.tick() {
                Tick::Wait(delay_ms) => handle.advance(delay_ms),
                Tick::Done | Tick::Idle => return,
            }
        }
        panic!("performance never finished");
    }

    fn note_on_pitches(sent: &[crate::perf::SentMessage], channel: u8) -> Vec<u8> {
        sent.iter()
            .filter(|m| m.bytes[0] == (0x90 | channel))
            .map(|m| m.bytes[1])
            .collect()
    }

    #[test]
    fn test_tick_while_stopped_is_idle() {
        let (mut scheduler, handle, _log) = setup(one_track_score());
        assert_eq!(scheduler.tick(), Tick::Idle);
        assert_eq!(handle.sent_count(), 0);
    }

    #[test]
    fn test_end_to_end_two_tracks_two_regions() {
        let (mut scheduler, handle, log) = setup(two_region_score());
        let options = PerformanceOptions {
            enabled_tracks: vec![true, true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 1,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        };
        scheduler.play(options);
        drive(&mut scheduler, &handle);
        assert!(scheduler.is_stopped());

        let sent = handle.take_sent();
        assert_eq!(note_on_pitches(&sent, 0), vec![60, 62, 64, 66]);
        assert_eq!(note_on_pitches(&sent, 1), vec![70, 72, 74, 76]);
        // Timestamps never run backwards, including the final flush.
        for pair in sent.windows(2) {
            assert!(pair[1].timestamp_ms >= pair[0].timestamp_ms);
        }
        // Hanging notes are flushed on both enabled channels.
        assert!(sent.iter().any(|m| m.bytes == vec![0xB0, 120, 0]));
        assert!(sent.iter().any(|m| m.bytes == vec![0xB1, 120, 0]));

        let log = log.lock().unwrap();
        assert_eq!(log.regions_ended, vec![0]);
        assert_eq!(log.endings.len(), 1);
        assert!((log.endings[0].1 - 2000.0).abs() < 1e-6);
        assert_eq!(
            log.positions,
            vec![0, 250, 500, 750, 1000, 1250, 1500, 1750, 2000]
        );
    }

    #[test]
    fn test_speed_factor_scales_scheduled_deltas() {
        let (mut scheduler, handle, _log) = setup(one_track_score());
        let mut options = PerformanceOptions {
            enabled_tracks: vec![true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 2.0,
            record: false,
        };
        scheduler.play(options.clone());
        drive(&mut scheduler, &handle);
        let fast = handle.take_sent();
        // 250 ms score deltas play back as 125 ms at double speed.
        assert!((fast[1].timestamp_ms - fast[0].timestamp_ms - 125.0).abs() < 1e-6);

        options.speed_factor = 0.5;
        scheduler.play(options);
        drive(&mut scheduler, &handle);
        let slow = handle.take_sent();
        assert!((slow[1].timestamp_ms - slow[0].timestamp_ms - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_pause_resume_preserves_message_sequence() {
        let (mut scheduler, handle, _log) = setup(two_region_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true, true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 1,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
        drive(&mut scheduler, &handle);
        let uninterrupted = handle.take_sent();

        let (mut scheduler, handle, _log) = setup(two_region_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true, true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 1,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
        match scheduler.tick() {
            Tick::Wait(_) => {}
            other => panic!("expected a wait, got {other:?}"),
        }
        scheduler.pause();
        assert_eq!(scheduler.tick(), Tick::Idle);
        handle.advance(5000.0);
        scheduler.resume();
        drive(&mut scheduler, &handle);
        let interrupted = handle.take_sent();

        assert_eq!(uninterrupted.len(), interrupted.len());
        for (a, b) in uninterrupted.iter().zip(&interrupted) {
            assert_eq!(a.bytes, b.bytes);
        }
        // Every inter-message gap survives the pause untouched except the
        // single gap the pause fell into, which grows by exactly the pause
        // duration.
        let mut stretched = Vec::new();
        for (a, b) in uninterrupted.windows(2).zip(interrupted.windows(2)) {
            let delta_a = a[1].timestamp_ms - a[0].timestamp_ms;
            let delta_b = b[1].timestamp_ms - b[0].timestamp_ms;
            if (delta_a - delta_b).abs() > 1e-6 {
                stretched.push(delta_b - delta_a);
            }
        }
        assert_eq!(stretched.len(), 1);
        assert!((stretched[0] - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_while_paused_excludes_open_pause() {
        let (mut scheduler, handle, log) = setup(one_track_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
        scheduler.tick();
        handle.advance(100.0);
        scheduler.pause();
        handle.advance(5000.0);
        scheduler.stop();
        let log = log.lock().unwrap();
        assert_eq!(log.endings.len(), 1);
        // Realized duration counts the 100 ms played, not the open pause.
        assert!((log.endings[0].1 - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_is_idempotent_and_scheduler_is_reusable() {
        let (mut scheduler, handle, log) = setup(one_track_score());
        let options = PerformanceOptions {
            enabled_tracks: vec![true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        };
        scheduler.play(options.clone());
        scheduler.tick();
        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.tick(), Tick::Idle);
        assert_eq!(log.lock().unwrap().endings.len(), 1);
        let sent = handle.take_sent();
        assert_eq!(sent.last().unwrap().bytes, vec![0xB0, 120, 0]);

        // Tracks were reset, so a fresh performance plays from the top.
        scheduler.play(options);
        drive(&mut scheduler, &handle);
        let sent = handle.take_sent();
        assert_eq!(note_on_pitches(&sent, 0), vec![60, 62, 64, 66]);
        assert_eq!(log.lock().unwrap().endings.len(), 2);
    }

    #[test]
    fn test_disabled_track_stays_silent() {
        let (mut scheduler, handle, log) = setup(two_region_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true, false],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 1,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
        drive(&mut scheduler, &handle);
        let sent = handle.take_sent();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|m| m.bytes[0] & 0x0F == 0));
        assert_eq!(log.lock().unwrap().endings.len(), 1);
    }

    #[test]
    fn test_catch_up_reports_one_overload() {
        let (mut scheduler, handle, log) = setup(one_track_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
        scheduler.tick();
        // Miss several wake-ups; the next tick catches up in one pass.
        handle.advance(1600.0);
        scheduler.tick();
        assert!(handle.sent_count() > 4);
        drive(&mut scheduler, &handle);
        assert_eq!(log.lock().unwrap().overloads, 1);
    }

    #[test]
    fn test_recording_captures_every_moment_message() {
        let (mut scheduler, handle, log) = setup(one_track_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: true,
        });
        drive(&mut scheduler, &handle);
        let sent = handle.take_sent();
        let log = log.lock().unwrap();
        // Everything except the one all-sound-off flush is recorded.
        assert_eq!(log.endings[0].0, Some(sent.len() - 1));
    }

    #[test]
    fn test_hidden_host_stops_after_grace_period() {
        let (mut scheduler, handle, log) = setup(one_track_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
        scheduler.tick();
        scheduler.set_host_visible(false);
        handle.advance(2500.0);
        assert_eq!(scheduler.tick(), Tick::Done);
        assert!(scheduler.is_stopped());
        assert_eq!(log.lock().unwrap().endings.len(), 1);
    }

    #[test]
    fn test_hidden_host_stops_paused_performance() {
        let (mut scheduler, handle, log) = setup(one_track_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
        scheduler.tick();
        scheduler.pause();
        scheduler.set_host_visible(false);
        handle.advance(2500.0);
        assert_eq!(scheduler.tick(), Tick::Done);
        assert!(scheduler.is_stopped());
        assert_eq!(log.lock().unwrap().endings.len(), 1);
    }

    #[test]
    fn test_repeated_region_replays_its_span() {
        let score = Score::compile(&ScoreDef {
            tracks: vec![track_def(0, 60)],
            regions: vec![
                RegionDef::new("verse", 0, 1000),
                RegionDef::new("verse again", 0, 1000),
            ],
        })
        .unwrap();
        let options = PerformanceOptions::whole_score(&score);
        let (mut scheduler, handle, log) = setup(score);
        scheduler.play(options);
        drive(&mut scheduler, &handle);
        let sent = handle.take_sent();
        assert_eq!(note_on_pitches(&sent, 0), vec![60, 62, 60, 62]);
        let log = log.lock().unwrap();
        assert_eq!(log.regions_ended, vec![0]);
        assert!((log.endings[0].1 - 2000.0).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "mask length mismatch")]
    fn test_play_rejects_wrong_mask_length() {
        let (mut scheduler, _handle, _log) = setup(one_track_score());
        scheduler.play(PerformanceOptions {
            enabled_tracks: vec![true, true],
            start_region_index: 0,
            start_ms_position: 0,
            end_region_index: 0,
            end_ms_position: 2000,
            speed_factor: 1.0,
            record: false,
        });
    }
}
