// Sync inspector - What the scheduler is about to play and what it just played
// Snapshots serialise to JSON for the CLI `inspect` command

use super::accompaniment::{AccompanimentEvent, AccompanimentState, TrackInfo};
use super::note::note_name;
use super::observer::{BeatInfo, ObserverResult, TransportObserver};
use super::transport::TransportState;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub const DEFAULT_UPCOMING_BEATS: usize = 6;
pub const DEFAULT_HISTORY_LEN: usize = 6;

/// Earliest note more than this far behind the clock is late
const LAG_THRESHOLD_SECS: f64 = -0.02;
/// Queued further ahead than this is early, with and without notes
const LEAD_THRESHOLD_NOTES_SECS: f64 = 0.15;
const LEAD_THRESHOLD_BEAT_SECS: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    OnTime,
    Lag,
    Lead,
    CountIn,
}

impl SyncStatus {
    /// Classify a beat by its earliest note, or by the beat itself when it
    /// carries no notes
    pub fn classify(count_in: bool, beat_delta: Option<f64>, note_deltas: &[f64]) -> Self {
        if count_in {
            return SyncStatus::CountIn;
        }
        let (earliest, lead_threshold) = match note_deltas.iter().copied().reduce(f64::min) {
            Some(min) => (Some(min), LEAD_THRESHOLD_NOTES_SECS),
            None => (beat_delta, LEAD_THRESHOLD_BEAT_SECS),
        };
        match earliest {
            Some(d) if d < LAG_THRESHOLD_SECS => SyncStatus::Lag,
            Some(d) if d > lead_threshold => SyncStatus::Lead,
            _ => SyncStatus::OnTime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingNote {
    pub pitch: u8,
    pub name: String,
    pub offset_beats: f64,
    pub start_time: f64,
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingBeat {
    /// Beat index since the run started, count-in included
    pub beat_index: u64,
    /// "Bar N · Beat M", one-based
    pub label: String,
    pub time: f64,
    pub delta: Option<f64>,
    pub count_in: bool,
    pub notes: Vec<UpcomingNote>,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnchorInfo {
    pub time: f64,
    pub offset_beats: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentBeat {
    pub beat_number: u64,
    pub beat_in_bar: u32,
    pub time: f64,
    pub count_in: bool,
    pub notes: Vec<AccompanimentEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentBeatView {
    #[serde(flatten)]
    pub beat: RecentBeat,
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
    pub now: Option<f64>,
    pub next_beat_time: f64,
    /// `next_beat_time - now`
    pub delta: Option<f64>,
    pub bpm: f64,
    pub seconds_per_beat: f64,
    pub running: bool,
    pub count_in_bars: u32,
    pub count_in_beats: u64,
    pub scheduled_beats: u64,
    /// Present while a track is loaded
    pub anchor: Option<AnchorInfo>,
    pub track: Option<TrackInfo>,
    pub upcoming: Vec<UpcomingBeat>,
    pub recent: Vec<RecentBeatView>,
}

impl SyncSnapshot {
    pub fn capture(
        transport: &TransportState,
        accompaniment: &AccompanimentState,
        now: Option<f64>,
        upcoming: usize,
    ) -> Self {
        let spb = transport.seconds_per_beat();
        let delta_from = |time: f64| now.map(|n| time - n);

        Self {
            now,
            next_beat_time: transport.next_note_time,
            delta: delta_from(transport.next_note_time),
            bpm: transport.bpm(),
            seconds_per_beat: spb,
            running: transport.is_running,
            count_in_bars: transport.count_in_bars,
            count_in_beats: accompaniment.count_in_beats,
            scheduled_beats: accompaniment.scheduled_beats,
            anchor: accompaniment.is_loaded().then_some(AnchorInfo {
                time: accompaniment.anchor_time,
                offset_beats: accompaniment.offset_beats,
            }),
            track: accompaniment.track().copied(),
            upcoming: upcoming_beats(transport, accompaniment, now, upcoming),
            recent: Vec::new(),
        }
    }

    /// Attach the recent-beat history, newest first
    pub fn with_history(mut self, history: &BeatHistory) -> Self {
        let now = self.now;
        self.recent = history
            .recent()
            .into_iter()
            .map(|beat| RecentBeatView {
                delta: now.map(|n| beat.time - n),
                beat,
            })
            .collect();
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn upcoming_beats(
    transport: &TransportState,
    accompaniment: &AccompanimentState,
    now: Option<f64>,
    count: usize,
) -> Vec<UpcomingBeat> {
    let spb = transport.seconds_per_beat();
    let per_bar = transport.beats_per_bar() as u64;
    let mut beat_in_bar = transport.upcoming_beat_in_bar();

    (0..count as u64)
        .map(|i| {
            let beat_index = accompaniment.scheduled_beats + i;
            let time = transport.next_note_time + i as f64 * spb;
            let count_in = beat_index < accompaniment.count_in_beats;
            let timeline_index = accompaniment.next_timeline_index() + i as i64;

            let notes: Vec<UpcomingNote> = if count_in {
                Vec::new()
            } else {
                accompaniment
                    .entries_at(timeline_index)
                    .iter()
                    .map(|entry| {
                        let start_time = time + entry.offset_beats * spb;
                        UpcomingNote {
                            pitch: entry.pitch,
                            name: note_name(entry.pitch),
                            offset_beats: entry.offset_beats,
                            start_time,
                            delta: now.map(|n| start_time - n),
                        }
                    })
                    .collect()
            };

            let delta = now.map(|n| time - n);
            let note_deltas: Vec<f64> = notes.iter().filter_map(|n| n.delta).collect();
            let beat = UpcomingBeat {
                beat_index,
                label: format!("Bar {} · Beat {}", beat_index / per_bar + 1, beat_in_bar + 1),
                time,
                delta,
                count_in,
                status: SyncStatus::classify(count_in, delta, &note_deltas),
                notes,
            };
            beat_in_bar = (beat_in_bar + 1) % per_bar as u32;
            beat
        })
        .collect()
}

/// Observer keeping the last few scheduled beats and their notes.
/// Clones share the same history.
#[derive(Debug, Clone)]
pub struct BeatHistory {
    beats: Rc<RefCell<VecDeque<RecentBeat>>>,
    capacity: usize,
}

impl BeatHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            beats: Rc::new(RefCell::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Newest first
    pub fn recent(&self) -> Vec<RecentBeat> {
        self.beats.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.beats.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.borrow().is_empty()
    }
}

impl Default for BeatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl TransportObserver for BeatHistory {
    fn name(&self) -> &str {
        "beat-history"
    }

    fn on_beat(&mut self, beat: &BeatInfo) -> ObserverResult<()> {
        let mut beats = self.beats.borrow_mut();
        // Beat number 0 is the start notice
        if beat.beat_number == 0 {
            beats.clear();
            return Ok(());
        }
        beats.push_front(RecentBeat {
            beat_number: beat.beat_number,
            beat_in_bar: beat.beat_in_bar,
            time: beat.time,
            count_in: beat.count_in,
            notes: Vec::new(),
        });
        beats.truncate(self.capacity);
        Ok(())
    }

    fn on_accompaniment_events(&mut self, events: &[AccompanimentEvent]) -> ObserverResult<()> {
        if let Some(latest) = self.beats.borrow_mut().front_mut() {
            latest.notes.extend_from_slice(events);
        }
        Ok(())
    }
}
