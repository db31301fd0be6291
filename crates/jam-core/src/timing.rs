//! Timing primitives for transport and scheduling.
//!
//! - [`TimeSignature`] - Musical time signature (e.g., 4/4, 3/4)
//! - [`Bars`] / [`Beats`] - Unit wrappers for musical lengths
//! - [`TransportClock`] - Looping transport that turns wall-clock deltas into
//!   a musical position in seconds
//!
//! The transport measures its position in seconds of real time. Tempo only
//! matters when that position is converted into beats or bars, and for the
//! loop length, which is a fixed number of bars.

use crate::error::EngineError;

/// Default number of bars in the transport loop.
pub const DEFAULT_LOOP_BARS: u32 = 16;

/// Default tempo of a new transport.
pub const DEFAULT_BPM: f64 = 120.0;

/// Wrapper type for beats (floating-point).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Beats(pub f64);

impl Beats {
    /// Get the beat value as f64.
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Convert beats to seconds at the given tempo.
    pub fn to_seconds(self, bpm: f64) -> f64 {
        self.0 * 60.0 / bpm
    }
}

/// Wrapper type for bars (floating-point).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Bars(pub f64);

impl Bars {
    /// Convert bars to beats using the given time signature.
    pub fn to_beats(self, signature: TimeSignature) -> Beats {
        Beats(self.0 * signature.beats_per_bar())
    }
}

/// Musical time signature (numerator/denominator).
///
/// The numerator indicates beats per bar, and the denominator indicates
/// the note value that gets one beat (4 = quarter note, 8 = eighth note).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    /// Create a new time signature.
    ///
    /// Values are clamped to at least 1 to prevent division by zero.
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator: numerator.max(1),
            denominator: denominator.max(1),
        }
    }

    /// Calculate the number of quarter-note beats per bar.
    ///
    /// For 4/4: 4 beats per bar
    /// For 3/4: 3 beats per bar
    /// For 6/8: 3 beats per bar (6 eighth notes = 3 quarter notes)
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64 * (4.0 / self.denominator as f64)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// Check that a tempo is usable.
pub fn validate_bpm(bpm: f64) -> Result<f64, EngineError> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm)
    } else {
        Err(EngineError::InvalidTempo(bpm))
    }
}

/// Looping transport clock.
///
/// The clock keeps an anchor pair (wall time, musical position) and
/// extrapolates from it at real-time speed while playing. Wall time only
/// moves through [`TransportClock::advance`], so the host decides where time
/// comes from.
#[derive(Clone, Debug)]
pub struct TransportClock {
    bpm: f64,
    signature: TimeSignature,
    loop_bars: u32,
    running: bool,
    /// Accumulated wall time in seconds.
    wall: f64,
    anchor_wall: f64,
    anchor_position: f64,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClock {
    /// Create a new transport clock at 120 BPM, 4/4 time, 16-bar loop, stopped at 0.
    pub fn new() -> Self {
        Self::with_loop(TimeSignature::default(), DEFAULT_LOOP_BARS)
    }

    /// Create a stopped clock with a custom time signature and loop length.
    pub fn with_loop(signature: TimeSignature, loop_bars: u32) -> Self {
        Self {
            bpm: DEFAULT_BPM,
            signature,
            loop_bars: loop_bars.max(1),
            running: false,
            wall: 0.0,
            anchor_wall: 0.0,
            anchor_position: 0.0,
        }
    }

    /// Get the current BPM.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Get the current time signature.
    pub fn time_signature(&self) -> TimeSignature {
        self.signature
    }

    /// Number of bars before the transport wraps.
    pub fn loop_bars(&self) -> u32 {
        self.loop_bars
    }

    /// Check if the transport is running.
    pub fn is_playing(&self) -> bool {
        self.running
    }

    /// Seconds per beat at the current tempo.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Length of the loop in beats.
    pub fn loop_beats(&self) -> f64 {
        Bars(self.loop_bars as f64).to_beats(self.signature).as_f64()
    }

    /// Length of the loop in seconds at the current tempo.
    ///
    /// With 4/4 and 16 bars this is `(60 / bpm) * 4 * 16`.
    pub fn loop_length(&self) -> f64 {
        self.loop_beats() * self.seconds_per_beat()
    }

    /// Set the tempo, re-anchoring at the current position.
    ///
    /// The position in seconds is continuous across the change. If the new,
    /// shorter loop no longer contains the position it is wrapped.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), EngineError> {
        let bpm = validate_bpm(bpm)?;
        self.reanchor();
        self.bpm = bpm;
        self.anchor_position = self.anchor_position.rem_euclid(self.loop_length());
        Ok(())
    }

    /// Start or resume the transport from the current position.
    pub fn play(&mut self) {
        if !self.running {
            self.anchor_wall = self.wall;
            self.running = true;
        }
    }

    /// Freeze the transport at the current position.
    pub fn pause(&mut self) {
        if self.running {
            self.reanchor();
            self.running = false;
        }
    }

    /// Stop the transport and rewind to 0.
    pub fn stop(&mut self) {
        self.running = false;
        self.anchor_wall = self.wall;
        self.anchor_position = 0.0;
    }

    /// Move the playhead to a position in seconds (wrapped into the loop).
    pub fn seek(&mut self, position: f64) {
        let position = if position.is_finite() { position.max(0.0) } else { 0.0 };
        self.anchor_wall = self.wall;
        self.anchor_position = position.rem_euclid(self.loop_length());
    }

    /// Advance wall time by `delta` seconds and return the loop position.
    ///
    /// Negative or non-finite deltas are ignored.
    pub fn advance(&mut self, delta: f64) -> f64 {
        if delta.is_finite() && delta > 0.0 {
            self.wall += delta;
        }
        let loop_length = self.loop_length();
        let raw = self.raw_position();
        if raw >= loop_length {
            // Re-base on wrap so the anchor offset stays small.
            self.anchor_position = raw.rem_euclid(loop_length);
            self.anchor_wall = self.wall;
        }
        self.position()
    }

    /// Current position in seconds, in `[0, loop_length)`.
    pub fn position(&self) -> f64 {
        self.raw_position().rem_euclid(self.loop_length())
    }

    /// Current position in beats at the current tempo.
    pub fn position_beats(&self) -> f64 {
        self.position() / self.seconds_per_beat()
    }

    /// Current position in bars.
    pub fn position_bars(&self) -> f64 {
        self.position_beats() / self.signature.beats_per_bar()
    }

    fn raw_position(&self) -> f64 {
        if self.running {
            self.anchor_position + (self.wall - self.anchor_wall)
        } else {
            self.anchor_position
        }
    }

    fn reanchor(&mut self) {
        self.anchor_position = self.position();
        self.anchor_wall = self.wall;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature_beats_per_bar() {
        assert!((TimeSignature::new(4, 4).beats_per_bar() - 4.0).abs() < 0.001);
        assert!((TimeSignature::new(3, 4).beats_per_bar() - 3.0).abs() < 0.001);
        assert!((TimeSignature::new(6, 8).beats_per_bar() - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_loop_length_matches_tempo() {
        let mut clock = TransportClock::new();
        assert!((clock.loop_length() - 32.0).abs() < 1e-9);
        clock.set_tempo(90.0).unwrap();
        assert!((clock.loop_length() - (60.0 / 90.0) * 4.0 * 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_stopped_clock_does_not_move() {
        let mut clock = TransportClock::new();
        assert_eq!(clock.advance(1.0), 0.0);
        assert!(!clock.is_playing());
    }

    #[test]
    fn test_position_wraps_exactly_at_loop_length() {
        let mut clock = TransportClock::new();
        clock.play();
        assert_eq!(clock.advance(16.0), 16.0);
        assert_eq!(clock.advance(16.0), 0.0);
        assert_eq!(clock.advance(0.5), 0.5);
    }

    #[test]
    fn test_advance_is_increasing_modulo_loop() {
        for bpm in [60.0, 97.5, 120.0, 174.0] {
            let mut clock = TransportClock::new();
            clock.set_tempo(bpm).unwrap();
            clock.play();
            let loop_length = clock.loop_length();
            let mut last = clock.position();
            let mut wraps = 0;
            for _ in 0..2000 {
                let pos = clock.advance(0.037);
                assert!(pos >= 0.0 && pos < loop_length);
                if pos <= last {
                    wraps += 1;
                    // A wrap lands near the start of the loop.
                    assert!(pos < 0.037 + 1e-9, "bpm {bpm}: {last} -> {pos}");
                }
                last = pos;
            }
            let expected = (2000.0 * 0.037 / loop_length).floor() as i32;
            assert_eq!(wraps, expected, "bpm {bpm}");
        }
    }

    #[test]
    fn test_tempo_change_keeps_position_continuous() {
        let mut clock = TransportClock::new();
        clock.play();
        clock.advance(10.0);
        clock.set_tempo(90.0).unwrap();
        assert!((clock.position() - 10.0).abs() < 1e-9);
        let pos = clock.advance(0.25);
        assert!((pos - 10.25).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_tempo_leaves_state_unchanged() {
        let mut clock = TransportClock::new();
        clock.play();
        clock.advance(3.0);
        assert_eq!(clock.set_tempo(0.0), Err(EngineError::InvalidTempo(0.0)));
        assert!(clock.set_tempo(-12.0).is_err());
        assert!(clock.set_tempo(f64::NAN).is_err());
        assert!((clock.bpm() - 120.0).abs() < 1e-9);
        assert!((clock.position() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_resets_and_play_resumes() {
        let mut clock = TransportClock::new();
        clock.play();
        clock.advance(2.0);
        clock.pause();
        clock.advance(5.0);
        assert!((clock.position() - 2.0).abs() < 1e-9);
        clock.play();
        assert!((clock.advance(1.0) - 3.0).abs() < 1e-9);
        clock.stop();
        assert_eq!(clock.position(), 0.0);
        assert!(!clock.is_playing());
    }

    #[test]
    fn test_position_in_beats_and_bars() {
        let mut clock = TransportClock::new();
        clock.play();
        clock.advance(3.0);
        assert!((clock.position_beats() - 6.0).abs() < 1e-9);
        assert!((clock.position_bars() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_seek_wraps_into_loop() {
        let mut clock = TransportClock::new();
        clock.seek(40.0);
        assert!((clock.position() - 8.0).abs() < 1e-9);
        clock.seek(-3.0);
        assert_eq!(clock.position(), 0.0);
    }
}
