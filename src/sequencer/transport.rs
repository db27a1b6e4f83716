// Transport - Tempo, meter and beat counters shared by the scheduler and speed trainer
// Owned by one metronome instance and passed by reference to the pieces that read it

use super::speed_trainer::SpeedTrainerConfig;
use super::timeline::{Tempo, TimeSignature, seconds_per_beat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schedule horizon used at ordinary tempi
pub const DEFAULT_HORIZON_SECS: f64 = 0.12;
/// Wider horizon used above FAST_TEMPO_BPM so enough beats stay queued
pub const FAST_HORIZON_SECS: f64 = 0.18;
/// Tempo above which the wider horizon applies
pub const FAST_TEMPO_BPM: f64 = 220.0;

/// How far ahead beats are queued, by tempo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonSettings {
    pub normal_secs: f64,
    pub fast_secs: f64,
    pub fast_threshold_bpm: f64,
}

impl HorizonSettings {
    pub fn for_bpm(&self, bpm: f64) -> f64 {
        if bpm > self.fast_threshold_bpm {
            self.fast_secs
        } else {
            self.normal_secs
        }
    }
}

impl Default for HorizonSettings {
    fn default() -> Self {
        Self {
            normal_secs: DEFAULT_HORIZON_SECS,
            fast_secs: FAST_HORIZON_SECS,
            fast_threshold_bpm: FAST_TEMPO_BPM,
        }
    }
}

/// Which beats of the bar produce an audible click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClickPattern {
    /// Every beat
    #[default]
    All,
    /// Beats 2 and 4 only (zero-based 1 and 3)
    BackBeats,
    /// Downbeat only
    Downbeat,
    /// No click on the beat; one click halfway between beats
    SilentMidpoint,
}

impl ClickPattern {
    /// Whether a click lands on the given zero-based beat of the bar.
    /// SilentMidpoint never clicks on a beat.
    pub fn clicks_on(&self, beat_in_bar: u32) -> bool {
        match self {
            ClickPattern::All => true,
            ClickPattern::BackBeats => beat_in_bar == 1 || beat_in_bar == 3,
            ClickPattern::Downbeat => beat_in_bar == 0,
            ClickPattern::SilentMidpoint => false,
        }
    }
}

impl FromStr for ClickPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ClickPattern::All),
            "24" | "back-beats" | "backbeats" => Ok(ClickPattern::BackBeats),
            "1" | "downbeat" => Ok(ClickPattern::Downbeat),
            "off" | "midpoint" | "silent-midpoint" => Ok(ClickPattern::SilentMidpoint),
            other => Err(format!("Unknown click pattern: {}", other)),
        }
    }
}

impl fmt::Display for ClickPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClickPattern::All => "all",
            ClickPattern::BackBeats => "back-beats",
            ClickPattern::Downbeat => "downbeat",
            ClickPattern::SilentMidpoint => "silent-midpoint",
        };
        f.write_str(name)
    }
}

/// Transport state
///
/// Invariants:
/// - `cur_beat_in_bar < beats_per_bar()` at all times
/// - `next_note_time` grows by one beat per scheduled beat while running
/// - `count_in_remaining` is only nonzero if the run started armed
#[derive(Debug, Clone)]
pub struct TransportState {
    tempo: Tempo,
    time_signature: TimeSignature,
    horizon: HorizonSettings,
    schedule_horizon: f64,

    pub accent_first: bool,
    pub click_pattern: ClickPattern,

    pub is_running: bool,
    /// Speed trainer enabled for this run
    pub armed: bool,

    /// Audio-clock time of the next beat not yet scheduled
    pub next_note_time: f64,
    pub cur_beat_in_bar: u32,
    pub bars: u64,
    pub beats: u64,

    /// Progress since the last tempo step
    pub since_bars: u32,
    pub since_seconds: f64,

    pub count_in_bars: u32,
    pub count_in_remaining: u32,

    /// Auto-stop requested off the bar line; honoured at the next downbeat
    pub stop_at_bar_line: bool,

    pub trainer: SpeedTrainerConfig,
}

impl TransportState {
    pub fn new(tempo: Tempo, time_signature: TimeSignature) -> Self {
        let mut state = Self {
            tempo,
            time_signature,
            horizon: HorizonSettings::default(),
            schedule_horizon: DEFAULT_HORIZON_SECS,
            accent_first: true,
            click_pattern: ClickPattern::All,
            is_running: false,
            armed: false,
            next_note_time: 0.0,
            cur_beat_in_bar: time_signature.beats_per_bar() - 1,
            bars: 1,
            beats: 0,
            since_bars: 0,
            since_seconds: 0.0,
            count_in_bars: 2,
            count_in_remaining: 0,
            stop_at_bar_line: false,
            trainer: SpeedTrainerConfig::default(),
        };
        state.set_tempo(tempo.bpm());
        state
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Set tempo (clamped to the valid range) and retune the schedule horizon
    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo = Tempo::new(bpm);
        self.schedule_horizon = self.horizon.for_bpm(self.tempo.bpm());
    }

    pub fn set_horizon_settings(&mut self, horizon: HorizonSettings) {
        self.horizon = horizon;
        self.schedule_horizon = horizon.for_bpm(self.tempo.bpm());
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.time_signature.numerator
    }

    pub fn beat_unit(&self) -> u32 {
        self.time_signature.denominator
    }

    /// Change meter; the beat position is folded back into the new bar
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        self.cur_beat_in_bar %= time_signature.beats_per_bar();
    }

    /// How far ahead of the clock beats are queued
    pub fn schedule_horizon(&self) -> f64 {
        self.schedule_horizon
    }

    /// Duration of one beat at the current tempo and meter
    pub fn seconds_per_beat(&self) -> f64 {
        seconds_per_beat(self.tempo.bpm(), self.time_signature.denominator)
    }

    /// Duration of one bar at the current tempo and meter
    pub fn seconds_per_bar(&self) -> f64 {
        self.tempo.bar_duration_seconds(&self.time_signature)
    }

    /// Zero-based index of the beat that will be scheduled next
    pub fn upcoming_beat_in_bar(&self) -> u32 {
        (self.cur_beat_in_bar + 1) % self.beats_per_bar()
    }

    pub fn in_count_in(&self) -> bool {
        self.count_in_remaining > 0
    }

    /// Reset musical counters before a run.
    ///
    /// The beat position is parked on the last beat of the bar so the next
    /// scheduled beat is the downbeat, one beat after `now`.
    pub fn reset_counters(&mut self, now: f64, one_beat: f64) {
        self.bars = 1;
        self.beats = 0;
        self.since_bars = 0;
        self.since_seconds = 0.0;
        self.cur_beat_in_bar = self.beats_per_bar() - 1;
        self.next_note_time = now + one_beat;
        self.count_in_remaining = if self.armed { self.count_in_bars } else { 0 };
        self.stop_at_bar_line = false;
    }

    /// Record the beat just scheduled and move to the next one.
    /// Returns true when that beat was the last of its bar.
    pub fn advance_beat(&mut self) -> bool {
        self.next_note_time += self.seconds_per_beat();
        self.beats += 1;
        self.cur_beat_in_bar = self.upcoming_beat_in_bar();
        self.cur_beat_in_bar == self.beats_per_bar() - 1
    }

    /// Bookkeeping for a completed bar, before the speed trainer looks at it
    pub fn complete_bar(&mut self) {
        self.bars += 1;
        if self.count_in_remaining == 1 {
            // Count-in ends with this bar: stepping starts counting from here
            self.since_bars = 0;
            self.since_seconds = 0.0;
        } else {
            self.since_bars += 1;
            self.since_seconds += self.seconds_per_bar();
        }
        self.count_in_remaining = self.count_in_remaining.saturating_sub(1);
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            bpm: self.bpm(),
            beats_per_bar: self.beats_per_bar(),
            beat_unit: self.beat_unit(),
            is_running: self.is_running,
            armed: self.armed,
            next_note_time: self.next_note_time,
            cur_beat_in_bar: self.cur_beat_in_bar,
            bars: self.bars,
            beats: self.beats,
            since_bars: self.since_bars,
            since_seconds: self.since_seconds,
            count_in_remaining: self.count_in_remaining,
            click_pattern: self.click_pattern,
        }
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new(Tempo::default(), TimeSignature::default())
    }
}

/// Read-only copy of the counters handed to observers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransportSnapshot {
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub beat_unit: u32,
    pub is_running: bool,
    pub armed: bool,
    pub next_note_time: f64,
    pub cur_beat_in_bar: u32,
    pub bars: u64,
    pub beats: u64,
    pub since_bars: u32,
    pub since_seconds: f64,
    pub count_in_remaining: u32,
    pub click_pattern: ClickPattern,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_tempo_clamps_and_adjusts_horizon() {
        let mut state = TransportState::default();

        state.set_tempo(500.0);
        assert_eq!(state.bpm(), 300.0);
        assert_eq!(state.schedule_horizon(), FAST_HORIZON_SECS);

        state.set_tempo(10.0);
        assert_eq!(state.bpm(), 20.0);
        assert_eq!(state.schedule_horizon(), DEFAULT_HORIZON_SECS);

        state.set_tempo(180.0);
        assert_eq!(state.bpm(), 180.0);
        assert_eq!(state.schedule_horizon(), DEFAULT_HORIZON_SECS);
    }

    #[test]
    fn test_custom_horizon_settings() {
        let mut state = TransportState::default();
        state.set_horizon_settings(HorizonSettings {
            normal_secs: 0.2,
            fast_secs: 0.3,
            fast_threshold_bpm: 150.0,
        });
        assert_eq!(state.schedule_horizon(), 0.2);

        state.set_tempo(151.0);
        assert_eq!(state.schedule_horizon(), 0.3);
    }

    #[test]
    fn test_reset_counters_primes_count_in_when_armed() {
        let mut state = TransportState::default();
        state.armed = true;
        state.count_in_bars = 3;
        state.bars = 9;
        state.beats = 31;
        state.since_seconds = 4.0;

        state.reset_counters(10.0, 0.5);

        assert_eq!(state.bars, 1);
        assert_eq!(state.beats, 0);
        assert_eq!(state.since_bars, 0);
        assert_eq!(state.since_seconds, 0.0);
        assert_eq!(state.cur_beat_in_bar, 3);
        assert_eq!(state.next_note_time, 10.5);
        assert_eq!(state.count_in_remaining, 3);
    }

    #[test]
    fn test_reset_counters_skips_count_in_when_not_armed() {
        let mut state = TransportState::new(Tempo::new(120.0), TimeSignature::three_four());
        state.count_in_bars = 4;

        state.reset_counters(0.0, 1.0);

        assert_eq!(state.cur_beat_in_bar, 2);
        assert_eq!(state.next_note_time, 1.0);
        assert_eq!(state.count_in_remaining, 0);
    }

    #[test]
    fn test_advance_beat_wraps_bar() {
        let mut state = TransportState::default();
        state.reset_counters(0.0, 0.5);

        // The downbeat is scheduled first; the bar ends with its fourth beat
        assert!(!state.advance_beat());
        assert_eq!(state.cur_beat_in_bar, 0);
        assert!(!state.advance_beat());
        assert!(!state.advance_beat());
        assert!(state.advance_beat());
        assert_eq!(state.upcoming_beat_in_bar(), 0);
        assert!(!state.advance_beat());
        assert_eq!(state.beats, 5);
        assert_eq!(state.next_note_time, 0.5 + 5.0 * 0.5);
    }

    #[test]
    fn test_complete_bar_resets_progress_when_count_in_ends() {
        let mut state = TransportState::default();
        state.armed = true;
        state.count_in_bars = 2;
        state.reset_counters(0.0, 0.5);

        state.complete_bar();
        assert_eq!(state.count_in_remaining, 1);

        state.complete_bar();
        assert_eq!(state.count_in_remaining, 0);
        assert_eq!(state.since_bars, 0);
        assert_eq!(state.since_seconds, 0.0);

        state.complete_bar();
        assert_eq!(state.since_bars, 1);
        assert_eq!(state.since_seconds, 2.0);
        assert_eq!(state.bars, 4);
    }

    #[test]
    fn test_meter_change_keeps_beat_in_range() {
        let mut state = TransportState::new(Tempo::new(120.0), TimeSignature::new(7, 8));
        state.cur_beat_in_bar = 6;
        state.set_time_signature(TimeSignature::three_four());
        assert!(state.cur_beat_in_bar < 3);
        assert_eq!(state.seconds_per_beat(), 0.5);
    }

    #[test]
    fn test_click_pattern_rules() {
        assert!((0..4).all(|b| ClickPattern::All.clicks_on(b)));
        assert_eq!(
            (0..4).filter(|&b| ClickPattern::BackBeats.clicks_on(b)).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!(ClickPattern::Downbeat.clicks_on(0));
        assert!(!ClickPattern::Downbeat.clicks_on(2));
        assert!(!(0..4).any(|b| ClickPattern::SilentMidpoint.clicks_on(b)));
    }

    #[test]
    fn test_click_pattern_parse() {
        assert_eq!("24".parse::<ClickPattern>(), Ok(ClickPattern::BackBeats));
        assert_eq!("off".parse::<ClickPattern>(), Ok(ClickPattern::SilentMidpoint));
        assert_eq!("Downbeat".parse::<ClickPattern>(), Ok(ClickPattern::Downbeat));
        assert!("sometimes".parse::<ClickPattern>().is_err());
    }
}
