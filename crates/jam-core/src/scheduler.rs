//! Lookahead event scheduler.
//!
//! The scheduler walks the loop in fixed quantum steps (a 16th note by
//! default). Each tick it commits every step that starts before
//! `now + lookahead`, converting note positions into absolute output-clock
//! times. Triggers are therefore placed ahead of real time and tick jitter
//! never reaches the audio.
//!
//! The step cursor is the high-water mark: a step is processed once per
//! loop pass. A per-pass set of committed `(region, note)` keys backs it up
//! so overlapping regions and re-syncs can never fire an event twice. Both
//! are re-armed when the cursor wraps to bar 0.
//!
//! Step durations are derived from the tempo at the moment a step is
//! processed, so a tempo change affects only steps that are not yet
//! committed.

use std::collections::HashSet;

use crate::config::SchedulerConfig;
use crate::mixer::MixGraph;
use crate::model::{Region, RegionId, Track, TrackId, TrackType};
use crate::output::{OutputSink, TriggerCommand};
use crate::soundbank::PatchRegistry;
use crate::timing::{Bars, TimeSignature};

/// Read-only view of everything a tick needs.
pub struct ScheduleContext<'a> {
    pub bpm: f64,
    pub signature: TimeSignature,
    pub loop_bars: u32,
    /// Transport position in beats, used when the cursor must re-sync.
    pub position_beats: f64,
    pub tracks: &'a [Track],
    pub mix: &'a MixGraph,
    pub registry: &'a PatchRegistry,
}

impl ScheduleContext<'_> {
    fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    fn loop_beats(&self) -> f64 {
        Bars(self.loop_bars as f64).to_beats(self.signature).as_f64()
    }
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Quantum steps committed.
    pub steps: usize,
    /// Triggers handed to the output.
    pub triggers: usize,
    /// Events skipped as malformed or already committed.
    pub skipped: usize,
    /// Whether the cursor was re-synced after falling too far behind.
    pub resynced: bool,
}

/// Position of the next uncommitted quantum.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Cursor {
    /// Loop pass counter.
    cycle: u64,
    /// Step index within the loop.
    step: u64,
    /// Beats into the step where scanning starts (non-zero only after a
    /// mid-step start).
    offset: f64,
    /// Output-clock time of `step + offset`.
    time: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct EventKey {
    cycle: u64,
    track: TrackId,
    region: RegionId,
    /// `None` for a region trigger.
    note: Option<usize>,
}

/// Beat-step scheduler with lookahead.
pub struct LookaheadScheduler {
    config: SchedulerConfig,
    cursor: Option<Cursor>,
    committed: HashSet<EventKey>,
    session: u64,
}

impl LookaheadScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            cursor: None,
            committed: HashSet::new(),
            session: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Whether a play session is active.
    pub fn is_running(&self) -> bool {
        self.cursor.is_some()
    }

    /// Current play session number. Bumped on every start and stop, so
    /// triggers committed before a stop are stale afterwards.
    pub fn session(&self) -> u64 {
        self.session
    }

    fn step_beats(&self) -> f64 {
        1.0 / self.config.steps_per_beat.max(1) as f64
    }

    fn steps_per_loop(&self, loop_beats: f64) -> u64 {
        ((loop_beats / self.step_beats()).round() as u64).max(1)
    }

    /// Begin a play session at `position_beats`, with that position
    /// sounding at output time `now`.
    pub fn start(&mut self, now: f64, position_beats: f64, signature: TimeSignature, loop_bars: u32) {
        let loop_beats = Bars(loop_bars as f64).to_beats(signature).as_f64();
        self.session += 1;
        self.committed.clear();
        self.cursor = Some(self.cursor_at(now, position_beats, loop_beats, 0));
        log::debug!(
            "[SCHEDULER] Session {} started at beat {:.3}",
            self.session,
            position_beats
        );
    }

    /// End the play session. Nothing further is committed until `start`.
    pub fn stop(&mut self) {
        if self.cursor.take().is_some() {
            log::debug!("[SCHEDULER] Session {} stopped", self.session);
            self.session += 1;
        }
        self.committed.clear();
    }

    fn cursor_at(&self, now: f64, position_beats: f64, loop_beats: f64, cycle: u64) -> Cursor {
        let step_beats = self.step_beats();
        let pos = if position_beats.is_finite() {
            position_beats.clamp(0.0, loop_beats)
        } else {
            0.0
        };
        let step = (pos / step_beats).floor() as u64;
        if step >= self.steps_per_loop(loop_beats) {
            return Cursor {
                cycle: cycle + 1,
                step: 0,
                offset: 0.0,
                time: now,
            };
        }
        Cursor {
            cycle,
            step,
            offset: (pos - step as f64 * step_beats).max(0.0),
            time: now,
        }
    }

    /// `(cycle, step)` of the next quantum to commit.
    pub fn next_step(&self) -> Option<(u64, u64)> {
        self.cursor.map(|c| (c.cycle, c.step))
    }

    /// Musical time in seconds, within the loop, up to which events are
    /// committed (at the given tempo).
    pub fn next_schedule_time(&self, bpm: f64) -> Option<f64> {
        self.cursor
            .map(|c| (c.step as f64 * self.step_beats() + c.offset) * 60.0 / bpm)
    }

    /// Output-clock time of the next uncommitted step.
    pub fn next_trigger_time(&self) -> Option<f64> {
        self.cursor.map(|c| c.time)
    }

    /// Commit every step that starts before `now + lookahead`.
    ///
    /// Never fails: malformed events are skipped and counted.
    pub fn tick(
        &mut self,
        now: f64,
        ctx: &ScheduleContext<'_>,
        sink: &mut dyn OutputSink,
    ) -> TickReport {
        let mut report = TickReport::default();
        let Some(mut cursor) = self.cursor else {
            return report;
        };

        let loop_beats = ctx.loop_beats();
        let steps_per_loop = self.steps_per_loop(loop_beats);
        let step_beats = self.step_beats();

        if now - cursor.time > self.config.max_lateness_seconds() {
            log::warn!(
                "[SCHEDULER] Cursor {:.3}s behind, re-syncing to beat {:.3}",
                now - cursor.time,
                ctx.position_beats
            );
            // A transport position behind the cursor means the loop wrapped
            // during the stall: that is a new pass.
            let cursor_beat = cursor.step as f64 * step_beats + cursor.offset;
            let cycle = if ctx.position_beats < cursor_beat {
                self.committed.clear();
                cursor.cycle + 1
            } else {
                cursor.cycle
            };
            cursor = self.cursor_at(now, ctx.position_beats, loop_beats, cycle);
            report.resynced = true;
        }

        let horizon = now + self.config.lookahead_seconds();
        while cursor.time < horizon && report.steps < self.config.max_steps_per_tick {
            let step_start = cursor.step as f64 * step_beats;
            let lo = step_start + cursor.offset;
            let hi = step_start + step_beats;

            self.commit_range(&cursor, lo, hi, now, ctx, sink, &mut report);

            // Tempo is read per step: committed times stay where they are.
            cursor.time += (hi - lo) * ctx.seconds_per_beat();
            cursor.offset = 0.0;
            cursor.step += 1;
            report.steps += 1;

            if cursor.step >= steps_per_loop {
                cursor.step = 0;
                cursor.cycle += 1;
                self.committed.clear();
                log::debug!("[SCHEDULER] Loop wrap, entering pass {}", cursor.cycle);
            }
        }

        if report.steps == self.config.max_steps_per_tick {
            log::debug!("[SCHEDULER] Step limit reached ({} steps)", report.steps);
        }

        self.cursor = Some(cursor);
        report
    }

    /// Commit all events whose beat falls in `[lo, hi)`.
    #[allow(clippy::too_many_arguments)]
    fn commit_range(
        &mut self,
        cursor: &Cursor,
        lo: f64,
        hi: f64,
        now: f64,
        ctx: &ScheduleContext<'_>,
        sink: &mut dyn OutputSink,
        report: &mut TickReport,
    ) {
        let spb = ctx.seconds_per_beat();
        let loop_beats = ctx.loop_beats();

        for track in ctx.tracks {
            if !ctx.mix.is_audible(&track.id) {
                continue;
            }
            let gain = ctx.mix.output_gain(&track.id);
            let pan = ctx.mix.strip(&track.id).map_or(track.pan, |s| s.pan);

            for region in &track.regions {
                if !region.is_well_formed() {
                    log::trace!(
                        "[SCHEDULER] Skipping malformed region '{}' on '{}'",
                        region.id,
                        track.id
                    );
                    report.skipped += 1;
                    continue;
                }
                let region_start = Bars(region.start).to_beats(ctx.signature).as_f64();
                let region_end = Bars(region.end()).to_beats(ctx.signature).as_f64();
                if region_start >= hi || region_end <= lo {
                    continue;
                }

                for event in region_events(track.track_type, region, region_start, region_end) {
                    let event = match event {
                        Ok(event) => event,
                        Err(index) => {
                            log::trace!(
                                "[SCHEDULER] Skipping note {} of region '{}'",
                                index,
                                region.id
                            );
                            report.skipped += 1;
                            continue;
                        }
                    };
                    if event.beat < lo || event.beat >= hi || event.beat >= loop_beats {
                        continue;
                    }

                    let key = EventKey {
                        cycle: cursor.cycle,
                        track: track.id.clone(),
                        region: region.id.clone(),
                        note: event.note,
                    };
                    if !self.committed.insert(key) {
                        report.skipped += 1;
                        continue;
                    }

                    let time = (cursor.time + (event.beat - lo) * spb).max(now);
                    log::trace!(
                        "[SCHEDULER] Commit {}:{}:{:?} beat {:.3} at {:.4}",
                        track.id,
                        region.id,
                        event.note,
                        event.beat,
                        time
                    );
                    sink.schedule_trigger(TriggerCommand {
                        track_id: track.id.clone(),
                        region_id: region.id.clone(),
                        patch: ctx.registry.resolve(track.patch_id.as_deref()),
                        time,
                        gain,
                        pan,
                        pitch: event.pitch,
                        velocity: event.velocity,
                        duration: event.length_beats * spb,
                        session: self.session,
                    });
                    report.triggers += 1;
                }
            }
        }
    }
}

/// A note or region start resolved to an absolute loop beat.
struct RegionEvent {
    note: Option<usize>,
    beat: f64,
    pitch: Option<u8>,
    velocity: f32,
    length_beats: f64,
}

/// Events of a region. `Err(index)` marks an unusable note.
fn region_events(
    track_type: TrackType,
    region: &Region,
    region_start: f64,
    region_end: f64,
) -> Vec<Result<RegionEvent, usize>> {
    let plays_notes = match track_type {
        TrackType::Midi => true,
        TrackType::Audio => false,
        TrackType::Hybrid => !region.notes.is_empty(),
    };

    if !plays_notes {
        return vec![Ok(RegionEvent {
            note: None,
            beat: region_start,
            pitch: None,
            velocity: 1.0,
            length_beats: region_end - region_start,
        })];
    }

    region
        .notes
        .iter()
        .enumerate()
        .filter_map(|(index, note)| {
            if !note.time.is_finite() || note.time < 0.0 || !note.duration.is_finite() {
                return Some(Err(index));
            }
            let beat = region_start + note.time;
            // Notes past the region end never sound.
            if beat >= region_end {
                return None;
            }
            Some(Ok(RegionEvent {
                note: Some(index),
                beat,
                pitch: Some(note.pitch.min(127)),
                velocity: note.velocity.clamp(0.0, 1.0),
                length_beats: note.duration.max(0.0).min(region_end - beat),
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MidiNote;
    use crate::output::{ManualClock, OutputClock, RecordingOutput};

    struct Rig {
        scheduler: LookaheadScheduler,
        tracks: Vec<Track>,
        mix: MixGraph,
        registry: PatchRegistry,
        out: RecordingOutput,
        clock: ManualClock,
        bpm: f64,
        loop_bars: u32,
        /// Transport position reported to the scheduler.
        position_beats: f64,
    }

    impl Rig {
        fn new(tracks: Vec<Track>) -> Self {
            let clock = ManualClock::new(10.0);
            Self {
                scheduler: LookaheadScheduler::new(SchedulerConfig::default()),
                mix: MixGraph::from_tracks(&tracks),
                tracks,
                registry: PatchRegistry::in_memory(),
                out: RecordingOutput::new(clock.clone()),
                clock,
                bpm: 120.0,
                loop_bars: 16,
                position_beats: 0.0,
            }
        }

        fn with_lookahead(&mut self, lookahead_ms: u64) {
            self.scheduler = LookaheadScheduler::new(SchedulerConfig {
                lookahead_ms,
                ..SchedulerConfig::default()
            });
        }

        fn start(&mut self, position_beats: f64) {
            let now = self.clock.now();
            self.scheduler
                .start(now, position_beats, TimeSignature::default(), self.loop_bars);
        }

        fn tick(&mut self) -> TickReport {
            let ctx = ScheduleContext {
                bpm: self.bpm,
                signature: TimeSignature::default(),
                loop_bars: self.loop_bars,
                position_beats: self.position_beats,
                tracks: &self.tracks,
                mix: &self.mix,
                registry: &self.registry,
            };
            let now = self.clock.now();
            self.scheduler.tick(now, &ctx, &mut self.out)
        }

        /// Tick with a repeating pattern of intervals until `duration` has passed.
        fn run(&mut self, duration: f64, intervals: &[f64]) {
            let end = self.clock.now() + duration;
            let mut i = 0;
            while self.clock.now() < end {
                self.tick();
                self.clock.advance(intervals[i % intervals.len()]);
                i += 1;
            }
        }
    }

    fn midi_track(id: &str, regions: Vec<Region>) -> Track {
        let mut track = Track::new(id, id, TrackType::Midi);
        for region in regions {
            track = track.with_region(region);
        }
        track
    }

    fn note(time: f64) -> MidiNote {
        MidiNote::new(60, time, 0.5, 0.8)
    }

    #[test]
    fn test_single_note_end_to_end() {
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 4.0).with_note(note(0.0))]);
        let mut rig = Rig::new(vec![track]);
        let start = rig.clock.now();
        rig.start(0.0);
        rig.run(0.2, &[0.025]);

        let triggers = rig.out.triggers();
        assert_eq!(triggers.len(), 1);
        let t = &triggers[0];
        assert!(t.time >= start && t.time <= start + 0.1, "time {}", t.time);
        assert_eq!(t.track_id, "t1");
        assert_eq!(t.pitch, Some(60));
        assert!((t.gain - 0.8).abs() < 1e-6);
        assert_eq!(t.patch.id, "patch_default");
    }

    #[test]
    fn test_overlapping_regions_fire_once_per_pass() {
        let notes_a: Vec<_> = (0..16).map(|i| note(i as f64 * 0.5)).collect();
        let notes_b = vec![note(0.0), note(0.3), note(1.7), note(3.99)];
        let track = midi_track(
            "t1",
            vec![
                Region::new("a", 0.0, 4.0).with_notes(notes_a.clone()),
                // Overlaps "a" from bar 1, one note shares a beat with "a".
                Region::new("b", 1.0, 2.0).with_notes(notes_b.clone()),
            ],
        );
        let mut rig = Rig::new(vec![track]);
        rig.bpm = 240.0;
        let start = rig.clock.now();
        let loop_length = 16.0 * 4.0 * 0.25;
        rig.start(0.0);
        // Jittery host timer, two full passes.
        rig.run(2.0 * loop_length - 0.2, &[0.015, 0.031, 0.022, 0.027]);

        let spb = 0.25;
        let mut expected: Vec<(String, f64)> = Vec::new();
        for pass in 0..2 {
            let base = start + pass as f64 * loop_length;
            for n in &notes_a {
                expected.push(("a".into(), base + n.time * spb));
            }
            for n in &notes_b {
                expected.push(("b".into(), base + (4.0 + n.time) * spb));
            }
        }

        let triggers = rig.out.triggers();
        assert_eq!(triggers.len(), expected.len());
        for (region, time) in &expected {
            let hits = triggers
                .iter()
                .filter(|t| &t.region_id == region && (t.time - time).abs() < 1e-6)
                .count();
            assert_eq!(hits, 1, "region {region} at {time}");
        }
    }

    #[test]
    fn test_wrap_inside_single_tick_rescans_from_bar_zero() {
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 1.0).with_note(note(0.0))]);
        let mut rig = Rig::new(vec![track]);
        rig.bpm = 240.0;
        rig.loop_bars = 1;
        rig.with_lookahead(2500);
        let start = rig.clock.now();
        rig.start(0.0);
        let report = rig.tick();

        let times: Vec<f64> = rig.out.triggers().iter().map(|t| t.time - start).collect();
        assert_eq!(times.len(), 3);
        for (i, t) in times.iter().enumerate() {
            assert!((t - i as f64).abs() < 1e-9);
        }
        assert_eq!(rig.scheduler.next_step(), Some((2, 8)));
        assert_eq!(report.steps, 40);
    }

    #[test]
    fn test_tempo_change_only_affects_uncommitted_steps() {
        let notes: Vec<_> = (0..8).map(|i| note(i as f64)).collect();
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 2.0).with_notes(notes)]);
        let mut rig = Rig::new(vec![track]);
        let start = rig.clock.now();
        rig.start(0.0);
        rig.run(1.0, &[0.025]);
        let before: Vec<f64> = rig.out.triggers().iter().map(|t| t.time).collect();
        let boundary = rig.scheduler.next_trigger_time().unwrap();

        rig.bpm = 60.0;
        rig.run(4.0, &[0.025]);
        let after: Vec<f64> = rig.out.triggers().iter().map(|t| t.time).collect();

        // Earlier triggers are untouched.
        assert_eq!(&after[..before.len()], &before[..]);
        // 120 bpm up to the boundary, 1 s per beat afterwards.
        assert!((before[1] - before[0] - 0.5).abs() < 1e-9);
        let first_new = after[before.len()];
        let beat_of_first_new = before.len() as f64;
        let boundary_beat = (boundary - start) / 0.5;
        assert!((first_new - (boundary + (beat_of_first_new - boundary_beat))).abs() < 1e-9);
        assert!((after[before.len() + 1] - first_new - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_muted_and_solo_tracks() {
        let a = midi_track("a", vec![Region::new("ra", 0.0, 1.0).with_note(note(0.0))]);
        let b = midi_track("b", vec![Region::new("rb", 0.0, 1.0).with_note(note(0.0))]);
        let c = midi_track("c", vec![Region::new("rc", 0.0, 1.0).with_note(note(0.0))]);
        let mut rig = Rig::new(vec![a, b, c]);
        rig.mix.toggle_mute("a").unwrap();
        rig.mix.toggle_solo("b").unwrap();
        rig.start(0.0);
        rig.tick();

        let tracks: Vec<&str> = rig.out.triggers().iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(tracks, vec!["b"]);
    }

    #[test]
    fn test_mix_changes_apply_to_next_trigger_only() {
        let notes: Vec<_> = (0..4).map(|i| note(i as f64)).collect();
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 1.0).with_notes(notes)]);
        let mut rig = Rig::new(vec![track]);
        rig.start(0.0);
        rig.run(0.3, &[0.025]);
        rig.mix.set_volume("t1", 0.25).unwrap();
        rig.run(1.5, &[0.025]);

        let gains: Vec<f32> = rig.out.triggers().iter().map(|t| t.gain).collect();
        assert_eq!(gains.len(), 4);
        assert!((gains[0] - 0.8).abs() < 1e-6);
        assert!(gains[1..].iter().all(|g| (g - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_malformed_region_is_skipped() {
        let mut broken = Region::new("bad", 0.0, 1.0).with_note(note(0.0));
        broken.duration = f64::NAN;
        let good = Region::new("good", 0.0, 1.0)
            .with_note(note(0.0))
            .with_note(note(1.0));
        let mut track = midi_track("t1", vec![good]);
        let mut bad_note = note(0.5);
        bad_note.time = f64::INFINITY;
        track.regions[0].notes.insert(1, bad_note);
        track.regions.insert(0, broken);

        let mut rig = Rig::new(vec![track]);
        rig.with_lookahead(1000);
        rig.start(0.0);
        let report = rig.tick();

        let regions: Vec<&str> = rig.out.triggers().iter().map(|t| t.region_id.as_str()).collect();
        assert_eq!(regions, vec!["good", "good"]);
        assert!(report.skipped >= 2);
    }

    #[test]
    fn test_audio_and_hybrid_regions() {
        let audio = Track::new("drums", "Drums", TrackType::Audio)
            .with_region(Region::new("groove", 0.0, 4.0))
            .with_region(Region::new("fill", 4.0, 4.0));
        let hybrid = Track::new("keys", "Keys", TrackType::Hybrid)
            .with_region(Region::new("plain", 0.0, 1.0))
            .with_region(Region::new("notes", 0.0, 1.0).with_note(note(0.5)));
        let mut rig = Rig::new(vec![audio, hybrid]);
        rig.start(0.0);
        rig.run(8.0, &[0.025]);

        let mut fired: Vec<(&str, Option<u8>)> = rig
            .out
            .triggers()
            .iter()
            .map(|t| (t.region_id.as_str(), t.pitch))
            .collect();
        fired.sort();
        assert_eq!(
            fired,
            vec![("fill", None), ("groove", None), ("notes", Some(60)), ("plain", None)]
        );
        let groove = rig.out.triggers().iter().find(|t| t.region_id == "groove").unwrap();
        assert!((groove.duration - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_bound_patch_is_resolved() {
        let mut rig = Rig::new(vec![]);
        let id = rig.registry.register(crate::patch::InstrumentPatch::new(
            "patch_bass",
            "Bass",
            crate::patch::PatchKind::Synth,
            Default::default(),
        ));
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 1.0).with_note(note(0.0))]).with_patch(id);
        rig.mix.add_track(&track);
        rig.tracks.push(track);
        rig.start(0.0);
        rig.tick();
        assert_eq!(rig.out.triggers()[0].patch.id, "patch_bass");
    }

    #[test]
    fn test_start_mid_step_skips_earlier_notes() {
        let track = midi_track(
            "t1",
            vec![Region::new("r1", 0.0, 1.0).with_note(note(0.0)).with_note(note(0.2))],
        );
        let mut rig = Rig::new(vec![track]);
        let start = rig.clock.now();
        rig.start(0.1);
        rig.tick();
        let triggers = rig.out.triggers();
        assert_eq!(triggers.len(), 1);
        assert!((triggers[0].time - (start + 0.1 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_stall_resyncs_instead_of_bursting() {
        let notes: Vec<_> = (0..16).map(|i| note(i as f64)).collect();
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 4.0).with_notes(notes)]);
        let mut rig = Rig::new(vec![track]);
        rig.start(0.0);
        rig.tick();
        assert_eq!(rig.out.triggers().len(), 1);

        // Host stalls for three seconds; the transport moved on to beat 6.
        let resumed = rig.clock.advance(3.0);
        rig.position_beats = 6.0;
        let report = rig.tick();
        assert!(report.resynced);
        assert_eq!(report.steps, 1);
        // Beats 1 to 5 are late and dropped; beat 6 sounds right away.
        let triggers = rig.out.triggers();
        assert_eq!(triggers.len(), 2);
        assert!((triggers[1].time - resumed).abs() < 1e-9);
    }

    #[test]
    fn test_stall_across_loop_boundary_starts_new_pass() {
        let notes: Vec<_> = (0..4).map(|i| note(i as f64)).collect();
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 1.0).with_notes(notes)]);
        let mut rig = Rig::new(vec![track]);
        rig.loop_bars = 1;
        rig.start(0.0);
        // Loop is 2 s long; stop ticking just before the boundary.
        rig.run(1.6, &[0.025]);
        assert_eq!(rig.out.triggers().len(), 4);

        // The stall ends after the wrap, 0.8 beats into the next pass.
        let resumed = rig.clock.advance(0.8);
        rig.position_beats = 0.8;
        let report = rig.tick();
        assert!(report.resynced);
        rig.run(0.8, &[0.025]);

        let fresh: Vec<f64> = rig.out.triggers()[4..].iter().map(|t| t.time - resumed).collect();
        assert_eq!(fresh.len(), 2, "{fresh:?}");
        assert!((fresh[0] - 0.1).abs() < 1e-6);
        assert!((fresh[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_stopped_scheduler_commits_nothing() {
        let track = midi_track("t1", vec![Region::new("r1", 0.0, 1.0).with_note(note(0.0))]);
        let mut rig = Rig::new(vec![track]);
        assert_eq!(rig.tick(), TickReport::default());
        rig.start(0.0);
        rig.scheduler.stop();
        assert!(!rig.scheduler.is_running());
        rig.tick();
        assert!(rig.out.triggers().is_empty());
    }

    #[test]
    fn test_session_increments_on_start_and_stop() {
        let mut rig = Rig::new(vec![]);
        rig.start(0.0);
        rig.start(0.0);
        assert_eq!(rig.scheduler.session(), 2);
        assert_eq!(rig.scheduler.next_schedule_time(120.0), Some(0.0));
        rig.scheduler.stop();
        assert_eq!(rig.scheduler.session(), 3);
        // Stopping an idle scheduler changes nothing.
        rig.scheduler.stop();
        assert_eq!(rig.scheduler.session(), 3);
    }
}
