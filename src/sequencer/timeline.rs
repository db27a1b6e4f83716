// Timeline - Tempo and meter representation
// Single source of the beat-duration formula every scheduled time derives from

use serde::{Deserialize, Serialize};
use std::fmt;

/// Slowest tempo the transport accepts
pub const MIN_BPM: f64 = 20.0;
/// Fastest tempo the transport accepts
pub const MAX_BPM: f64 = 300.0;
/// Tempo used when a caller hands us something that is not a number
pub const DEFAULT_BPM: f64 = 120.0;

/// Duration of one notated beat in seconds.
///
/// `bpm` is quarter-note based; `beat_unit` is the notated beat value
/// (quarter = 4, eighth = 8, ...), so 6/8 at 120 bpm gives 0.25 s per beat.
#[inline]
pub fn seconds_per_beat(bpm: f64, beat_unit: u32) -> f64 {
    (60.0 / bpm) * (4.0 / beat_unit as f64)
}

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,   // Beats per bar
    pub denominator: u32, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    pub const MAX_BEATS_PER_BAR: u32 = 32;
    pub const MAX_BEAT_UNIT: u32 = 32;

    /// Creates a time signature, clamping both parts to playable values.
    /// The denominator is rounded up to the next power of two.
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator: numerator.clamp(1, Self::MAX_BEATS_PER_BAR),
            denominator: denominator
                .clamp(1, Self::MAX_BEAT_UNIT)
                .next_power_of_two(),
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Number of beats per bar
    pub fn beats_per_bar(&self) -> u32 {
        self.numerator
    }

    /// Beat duration relative to quarter note
    /// Example: 4/4 = 1.0, 6/8 = 0.5 (eighth notes)
    pub fn beat_duration_multiplier(&self) -> f64 {
        4.0 / self.denominator as f64
    }

    /// Bar length expressed in quarter notes (6/8 = 3.0)
    pub fn quarters_per_bar(&self) -> f64 {
        self.numerator as f64 * self.beat_duration_multiplier()
    }

    /// Parse "7/8" style strings
    pub fn parse(text: &str) -> Option<Self> {
        let (num, den) = text.trim().split_once('/')?;
        let numerator = num.trim().parse().ok()?;
        let denominator = den.trim().parse().ok()?;
        Some(Self::new(numerator, denominator))
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute), always inside [MIN_BPM, MAX_BPM]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo, clamping out-of-range values.
    /// Non-finite input falls back to DEFAULT_BPM.
    pub fn new(bpm: f64) -> Self {
        let bpm = if bpm.is_finite() { bpm } else { DEFAULT_BPM };
        Self {
            bpm: bpm.clamp(MIN_BPM, MAX_BPM),
        }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds for the given meter
    pub fn beat_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        seconds_per_beat(self.bpm, time_signature.denominator)
    }

    /// Duration of one bar in seconds at given time signature
    pub fn bar_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        self.beat_duration_seconds(time_signature) * time_signature.beats_per_bar() as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl From<f64> for Tempo {
    fn from(bpm: f64) -> Self {
        Self::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}
