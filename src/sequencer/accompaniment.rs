// Accompaniment - Keeps a loaded backing track locked to the metronome's beat clock
// The track is indexed by scheduled beats; the anchor maps track beats to clock time

use super::beat_timeline::{BeatTimeline, MIN_NOTE_BEATS, TimelineEntry};
use super::note::AccompanimentNote;
use super::timeline::TimeSignature;
use super::transport::TransportState;
use serde::Serialize;

/// Instrument used when nothing else is selected
pub const DEFAULT_INSTRUMENT: &str = "synth";

/// A note ready for the renderer, in clock time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccompanimentEvent {
    pub start_time: f64,
    pub duration_secs: f64,
    pub pitch: u8,
    pub velocity: u8,
    /// velocity / 127 scaled by the accompaniment volume
    pub gain: f32,
}

/// Metadata kept from the parsed track for inspection
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackInfo {
    pub total_beats: f64,
    pub bar_estimate: f64,
    pub time_signature: TimeSignature,
    pub duration_seconds: f64,
    pub note_count: usize,
}

impl TrackInfo {
    /// Loop length hint: the track rounded up to a whole bar of its own meter
    pub fn loop_hint(&self) -> usize {
        let per_bar = self.time_signature.beats_per_bar().max(1) as f64;
        if !self.total_beats.is_finite() || self.total_beats <= 0.0 {
            return 0;
        }
        ((self.total_beats / per_bar).ceil() * per_bar) as usize
    }
}

/// Backing track position and mixing state
#[derive(Debug, Clone)]
pub struct AccompanimentState {
    pub enabled: bool,
    volume: f32,
    instrument_id: String,

    timeline: BeatTimeline,
    track: Option<TrackInfo>,

    /// Clock time of the transport beat at the anchor
    pub anchor_time: f64,
    /// Transport beat count at the anchor
    pub anchor_beat: u64,
    /// Beats handed to `schedule_due` since the last reset
    pub scheduled_beats: u64,
    /// Silent beats before the first track beat
    pub count_in_beats: u64,
    /// Track beat 0 relative to the anchor, in beats
    pub offset_beats: f64,
}

impl AccompanimentState {
    pub fn new(enabled: bool, volume: f32, instrument_id: impl Into<String>) -> Self {
        Self {
            enabled,
            volume: clamp_volume(volume),
            instrument_id: instrument_id.into(),
            timeline: BeatTimeline::default(),
            track: None,
            anchor_time: 0.0,
            anchor_beat: 0,
            scheduled_beats: 0,
            count_in_beats: 0,
            offset_beats: 0.0,
        }
    }

    /// Replace the loaded track. Position bookkeeping is left to the caller
    /// (a fresh anchor at start, or a bar-aligned one while running).
    pub fn load(&mut self, notes: &[AccompanimentNote], info: TrackInfo) {
        self.timeline = BeatTimeline::build(notes, info.loop_hint());
        self.track = Some(info);
        self.scheduled_beats = 0;
    }

    /// Forget the loaded track; volume, instrument and enable flag survive
    pub fn clear(&mut self) {
        self.timeline = BeatTimeline::default();
        self.track = None;
        self.stop(false);
    }

    pub fn is_loaded(&self) -> bool {
        self.track.is_some() && !self.timeline.is_empty()
    }

    pub fn track(&self) -> Option<&TrackInfo> {
        self.track.as_ref()
    }

    pub fn timeline(&self) -> &BeatTimeline {
        &self.timeline
    }

    pub fn loop_beats(&self) -> usize {
        self.timeline.loop_beats()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn set_instrument_id(&mut self, id: impl Into<String>) {
        self.instrument_id = id.into();
    }

    /// Anchor the track at the next scheduled beat.
    ///
    /// An armed run plays its count-in before the first track beat.
    pub fn reset_anchor(&mut self, transport: &TransportState) {
        self.anchor_time = transport.next_note_time;
        self.anchor_beat = transport.beats;
        self.count_in_beats = if transport.armed {
            transport.count_in_bars as u64 * transport.beats_per_bar() as u64
        } else {
            0
        };
        self.offset_beats = self.count_in_beats as f64;
        self.scheduled_beats = 0;
    }

    /// Start the track on the next bar line, after whatever count-in remains
    pub fn align_to_next_bar(&mut self, transport: &TransportState) {
        let per_bar = transport.beats_per_bar() as u64;
        let upcoming = transport.upcoming_beat_in_bar() as u64;
        let to_bar_line = (per_bar - upcoming) % per_bar;

        let wait = if transport.count_in_remaining > 0 {
            // The current bar is itself part of the count-in
            (per_bar - upcoming) + (transport.count_in_remaining as u64 - 1) * per_bar
        } else {
            to_bar_line
        };

        self.anchor_time = transport.next_note_time;
        self.anchor_beat = transport.beats;
        self.count_in_beats = wait;
        self.offset_beats = wait as f64;
        self.scheduled_beats = 0;
    }

    /// Move the anchor to the next scheduled beat without touching progress.
    /// Used after tempo changes and instrument switches.
    pub fn reanchor(&mut self, transport: &TransportState) {
        self.anchor_time = transport.next_note_time;
        self.anchor_beat = transport.beats;
        self.offset_beats = self.count_in_beats as f64 - self.scheduled_beats as f64;
    }

    /// Timeline index the next call to `schedule_due` will play, before wrapping.
    /// Negative while the count-in is still running.
    pub fn next_timeline_index(&self) -> i64 {
        self.scheduled_beats as i64 - self.count_in_beats as i64
    }

    /// Entries for a timeline index, wrapped over the loop; empty for
    /// count-in positions or when nothing is loaded
    pub fn entries_at(&self, timeline_index: i64) -> &[TimelineEntry] {
        let loop_beats = self.timeline.loop_beats();
        if timeline_index < 0 || loop_beats == 0 {
            return &[];
        }
        self.timeline.beat(timeline_index as usize % loop_beats)
    }

    /// Events starting in the beat that begins at `beat_start`.
    ///
    /// Always advances the scheduled-beat counter, so the track keeps its
    /// place even when nothing is due (count-in, empty beats, disabled).
    pub fn schedule_due(&mut self, beat_start: f64, seconds_per_beat: f64) -> Vec<AccompanimentEvent> {
        let index = self.next_timeline_index();
        self.scheduled_beats += 1;

        self.entries_at(index)
            .iter()
            .map(|entry| AccompanimentEvent {
                start_time: beat_start + entry.offset_beats * seconds_per_beat,
                duration_secs: entry.duration_beats.max(MIN_NOTE_BEATS) * seconds_per_beat,
                pitch: entry.pitch,
                velocity: entry.velocity,
                gain: entry.velocity as f32 / 127.0 * self.volume,
            })
            .collect()
    }

    /// Clock time of a track beat under the current anchor
    pub fn compute_note_time(&self, note_beat: f64, seconds_per_beat: f64) -> f64 {
        compute_note_time(note_beat, self.offset_beats, self.anchor_time, seconds_per_beat)
    }

    /// Reset playback bookkeeping after the renderer was silenced.
    /// With `preserve_progress` the track resumes where it left off.
    pub fn stop(&mut self, preserve_progress: bool) {
        if preserve_progress {
            return;
        }
        self.scheduled_beats = 0;
        self.count_in_beats = 0;
        self.offset_beats = 0.0;
    }
}

impl Default for AccompanimentState {
    fn default() -> Self {
        Self::new(true, 0.8, DEFAULT_INSTRUMENT)
    }
}

/// `anchor_time + (note_beat + offset_beats) * seconds_per_beat`
pub fn compute_note_time(
    note_beat: f64,
    offset_beats: f64,
    anchor_time: f64,
    seconds_per_beat: f64,
) -> f64 {
    anchor_time + (note_beat + offset_beats) * seconds_per_beat
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 }
}
