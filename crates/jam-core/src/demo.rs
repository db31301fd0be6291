//! Built-in demo session.

use crate::model::{MidiNote, ProjectState, Region, Track, TrackType};

/// Walking bass line, one note per beat.
const BASS_LINE: [u8; 8] = [40, 43, 45, 47, 48, 47, 45, 43];

/// Pentatonic balafon figure on eighth notes.
const BALAFON_FIGURE: [u8; 6] = [67, 69, 72, 74, 76, 74];

/// The session a new jam starts with: drums, bass and a balafon lead.
pub fn demo_project() -> ProjectState {
    let drums = Track::new("t1", "Afrobeat Drums", TrackType::Audio)
        .with_color("#ef4444")
        .with_volume(0.8)
        .with_instrument("Drum Kit")
        .with_region(
            Region::new("r1", 0.0, 4.0)
                .with_name("Main Groove")
                .with_color("#ef4444"),
        )
        .with_region(Region::new("r2", 4.0, 4.0).with_name("Fill").with_color("#ef4444"));

    let bass_notes = (0..32).map(|beat| {
        let pitch = BASS_LINE[beat % BASS_LINE.len()];
        MidiNote::new(pitch, beat as f64, 0.9, if beat % 4 == 0 { 0.95 } else { 0.75 })
    });
    let bass = Track::new("t2", "Makossa Bass", TrackType::Midi)
        .with_color("#3b82f6")
        .with_volume(0.75)
        .with_instrument("Electric Bass")
        .with_region(
            Region::new("r3", 0.0, 8.0)
                .with_name("Walking Bass")
                .with_color("#3b82f6")
                .with_notes(bass_notes),
        );

    let lead_notes = (0..48)
        .filter(|step| step % 8 != 7)
        .map(|step| {
            let pitch = BALAFON_FIGURE[step % BALAFON_FIGURE.len()];
            MidiNote::new(pitch, step as f64 * 0.5, 0.25, 0.7)
        });
    let lead = Track::new("t3", "Balafon Lead", TrackType::Midi)
        .with_color("#f59e0b")
        .with_volume(0.6)
        .with_pan(0.2)
        .with_instrument("Balafon")
        .with_region(
            Region::new("r4", 2.0, 6.0)
                .with_name("Solo")
                .with_color("#f59e0b")
                .with_notes(lead_notes),
        );

    ProjectState {
        tracks: vec![drums, bass, lead],
        ..ProjectState::default()
    }
}
