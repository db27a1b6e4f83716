// Beat timeline - Per-beat bucketed lookup of accompaniment notes
// Built once per loaded track so the scheduler can ask "what starts on beat K" in O(1)

use super::note::AccompanimentNote;

/// Shortest note length in beats; protects the renderer from zero-length events
pub const MIN_NOTE_BEATS: f64 = 0.05;

/// Longest loop a timeline will hold, one slot per beat
pub const MAX_TIMELINE_BEATS: usize = 65_536;

/// One note inside a beat slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEntry {
    /// Position inside the beat, in [0, 1)
    pub offset_beats: f64,
    /// Length in beats, never below MIN_NOTE_BEATS
    pub duration_beats: f64,
    pub pitch: u8,
    pub velocity: u8,
}

/// Loopable beat timeline
///
/// Slot `k` holds every note whose start falls in `[k, k+1)` beats, sorted by
/// offset. Immutable once built; a new track builds a new timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatTimeline {
    slots: Vec<Vec<TimelineEntry>>,
}

impl BeatTimeline {
    /// Build a timeline from an unsorted note list.
    ///
    /// `min_loop_beats` extends the loop past the last note (e.g. to a bar
    /// boundary). An empty or fully filtered input yields an empty timeline.
    /// Notes starting at or past `MAX_TIMELINE_BEATS` are dropped and the
    /// loop never grows beyond it.
    pub fn build(notes: &[AccompanimentNote], min_loop_beats: usize) -> Self {
        let mut indexed: Vec<(usize, TimelineEntry)> = Vec::with_capacity(notes.len());

        for note in notes {
            if !note.start_beats.is_finite()
                || note.start_beats < 0.0
                || note.start_beats >= MAX_TIMELINE_BEATS as f64
            {
                continue;
            }

            let base = note.start_beats.floor();
            let offset = (note.start_beats - base).clamp(0.0, 1.0 - f64::EPSILON);
            // NaN durations also land on the floor
            let duration_beats = note.duration_beats.max(MIN_NOTE_BEATS);

            indexed.push((
                base as usize,
                TimelineEntry {
                    offset_beats: offset,
                    duration_beats,
                    pitch: note.pitch,
                    velocity: note.velocity,
                },
            ));
        }

        let Some(highest) = indexed.iter().map(|(index, _)| *index).max() else {
            return Self::default();
        };

        let loop_beats = min_loop_beats.min(MAX_TIMELINE_BEATS).max(highest + 1);
        let mut slots = vec![Vec::new(); loop_beats];
        for (index, entry) in indexed {
            slots[index].push(entry);
        }

        // sort_by is stable: equal offsets keep input order
        for slot in &mut slots {
            slot.sort_by(|a, b| a.offset_beats.total_cmp(&b.offset_beats));
        }

        Self { slots }
    }

    /// Number of beats before the timeline repeats
    pub fn loop_beats(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Entries starting in the given beat (after wrapping)
    pub fn beat(&self, index: usize) -> &[TimelineEntry] {
        self.slots.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of notes in the timeline
    pub fn note_count(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }
}
