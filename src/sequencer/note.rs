// Note representation for the accompaniment
// A note is a pitch/velocity pair positioned in beats, as produced by the MIDI file parser

use serde::{Deserialize, Serialize};

/// A backing-track note positioned on the beat grid.
///
/// Positions are stored in beats (not seconds) so the same track follows any
/// tempo the transport runs at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccompanimentNote {
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// MIDI velocity (0-127)
    pub velocity: u8,

    /// Start position in beats from the start of the track
    pub start_beats: f64,

    /// Duration in beats
    pub duration_beats: f64,
}

impl AccompanimentNote {
    /// Creates a new note, clamping pitch and velocity into the MIDI range
    pub fn new(pitch: u8, velocity: u8, start_beats: f64, duration_beats: f64) -> Self {
        Self {
            pitch: pitch.min(127),
            velocity: velocity.min(127),
            start_beats,
            duration_beats,
        }
    }

    /// End position in beats
    pub fn end_beats(&self) -> f64 {
        self.start_beats + self.duration_beats
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> String {
        note_name(self.pitch)
    }
}

/// Name of a MIDI pitch, octave numbered so that 60 = C4
pub fn note_name(pitch: u8) -> String {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    let octave = (pitch / 12) as i32 - 1;
    let note_index = (pitch % 12) as usize;

    format!("{}{}", NOTE_NAMES[note_index], octave)
}
