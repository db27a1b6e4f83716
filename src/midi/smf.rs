// Standard MIDI File reader - Turns a format 0/1 file into accompaniment notes
//
// Only metrical (ticks per quarter) division is supported. Notes from all
// tracks are merged; beats are quarter notes, seconds follow the tempo map.

use super::event::MidiEvent;
use crate::sequencer::accompaniment::TrackInfo;
use crate::sequencer::beat_timeline::MAX_TIMELINE_BEATS;
use crate::sequencer::note::AccompanimentNote;
use crate::sequencer::timeline::TimeSignature;
use std::collections::HashMap;
use thiserror::Error;

const TEMPO_META: u8 = 0x51;
const TIME_SIGNATURE_META: u8 = 0x58;
/// 120 bpm, the SMF default
const DEFAULT_TEMPO_US: u32 = 500_000;
const MIN_NOTE_SECONDS: f64 = 0.05;
/// Unterminated notes ring for half a beat, never shorter than this
const MIN_UNMATCHED_BEATS: f64 = 0.25;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Invalid MIDI file: {0}")]
    InvalidHeader(String),

    #[error("SMPTE time division is not supported")]
    SmpteUnsupported,

    #[error("Unexpected end of file at byte {0}")]
    Truncated(usize),

    #[error("Running status without a preceding status byte at byte {0}")]
    InvalidRunningStatus(usize),

    #[error("Variable-length quantity too long at byte {0}")]
    InvalidVarLen(usize),

    #[error("Track contains no playable notes")]
    NoPlayableNotes,

    #[error("Track runs {beats:.0} beats, longer than the {max} beat limit")]
    TrackTooLong { beats: f64, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrackResult<T> = Result<T, TrackError>;

/// Result of parsing a whole file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTrack {
    /// Sorted by start
    pub notes: Vec<AccompanimentNote>,
    /// Last note end (or last event) in beats
    pub total_beats: f64,
    /// `total_beats` in bars of the primary time signature
    pub bar_estimate: f64,
    /// First time signature in the file, 4/4 when absent
    pub time_signature: TimeSignature,
    pub ticks_per_beat: u16,
    /// Last note end in seconds under the file's tempo map
    pub duration_seconds: f64,
}

impl ParsedTrack {
    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            total_beats: self.total_beats,
            bar_estimate: self.bar_estimate,
            time_signature: self.time_signature,
            duration_seconds: self.duration_seconds,
            note_count: self.notes.len(),
        }
    }

    pub fn is_playable(&self) -> bool {
        !self.notes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum RawKind {
    Tempo(u32),
    NoteOn { key: (u8, u8), velocity: u8 },
    NoteOff { key: (u8, u8) },
}

#[derive(Debug, Clone, Copy)]
struct RawEvent {
    ticks: u64,
    kind: RawKind,
}

#[derive(Debug, Clone, Copy)]
struct ActiveNote {
    velocity: u8,
    start_ticks: u64,
    start_seconds: f64,
    order: usize,
}

/// Big-endian cursor with bounds-checked reads
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> TrackResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(TrackError::Truncated(self.pos))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> TrackResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> TrackResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> TrackResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn peek(&self) -> TrackResult<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(TrackError::Truncated(self.pos))
    }

    /// Variable-length quantity, at most four bytes
    fn var_len(&mut self) -> TrackResult<u32> {
        let start = self.pos;
        let mut value = 0u32;
        for _ in 0..4 {
            let byte = self.u8()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(TrackError::InvalidVarLen(start))
    }
}

/// Parse a Standard MIDI File.
///
/// A well-formed file without notes parses fine; callers that need
/// something to play check `is_playable`.
pub fn parse(bytes: &[u8]) -> TrackResult<ParsedTrack> {
    let mut reader = Reader::new(bytes);

    let chunk_id = reader
        .take(4)
        .map_err(|_| TrackError::InvalidHeader("missing header".into()))?;
    if chunk_id != b"MThd" {
        return Err(TrackError::InvalidHeader("missing header".into()));
    }
    let header_len = reader.u32()?;
    if header_len != 6 {
        return Err(TrackError::InvalidHeader(format!(
            "unsupported header length {}",
            header_len
        )));
    }
    let format = reader.u16()?;
    let track_count = reader.u16()?;
    let division = reader.u16()?;

    if division & 0x8000 != 0 {
        return Err(TrackError::SmpteUnsupported);
    }
    if division == 0 {
        return Err(TrackError::InvalidHeader("zero ticks per beat".into()));
    }
    let ticks_per_beat = division;

    log::debug!(
        "SMF format {}, {} tracks, {} ticks per beat",
        format,
        track_count,
        ticks_per_beat
    );

    let mut events = Vec::new();
    let mut time_signatures = Vec::new();

    for _ in 0..track_count {
        let id = reader.take(4)?;
        let len = reader.u32()? as usize;
        let body = reader.take(len)?;
        if id != b"MTrk" {
            // Unknown chunks are skipped
            continue;
        }
        read_track(body, reader.pos - len, &mut events, &mut time_signatures)?;
    }

    let parsed = build_notes(events, time_signatures.first().copied(), ticks_per_beat);
    if parsed.total_beats > MAX_TIMELINE_BEATS as f64 {
        return Err(TrackError::TrackTooLong {
            beats: parsed.total_beats,
            max: MAX_TIMELINE_BEATS,
        });
    }
    Ok(parsed)
}

fn read_track(
    body: &[u8],
    base: usize,
    events: &mut Vec<RawEvent>,
    time_signatures: &mut Vec<TimeSignature>,
) -> TrackResult<()> {
    let mut reader = Reader::new(body);
    let mut running_status: Option<u8> = None;
    let mut ticks = 0u64;

    let at = |reader: &Reader| base + reader.pos;

    while reader.pos < body.len() {
        ticks += reader.var_len().map_err(|e| offset_error(e, base))? as u64;
        if reader.pos >= body.len() {
            break;
        }

        let mut status = reader.peek()?;
        if status < 0x80 {
            status = running_status.ok_or(TrackError::InvalidRunningStatus(at(&reader)))?;
        } else {
            reader.pos += 1;
            // Meta and sysex events leave running status as it was
            if status < 0xF0 {
                running_status = Some(status);
            }
        }

        match status {
            0xFF => {
                if reader.pos >= body.len() {
                    break;
                }
                let meta_type = reader.u8()?;
                let len = reader.var_len().map_err(|e| offset_error(e, base))? as usize;
                let data = reader.take(len).map_err(|e| offset_error(e, base))?;
                match meta_type {
                    TEMPO_META if len == 3 => {
                        let tempo = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                        events.push(RawEvent {
                            ticks,
                            kind: RawKind::Tempo(tempo),
                        });
                    }
                    TIME_SIGNATURE_META if len >= 2 => {
                        let numerator = if data[0] == 0 { 4 } else { data[0] as u32 };
                        let denominator = 1u32 << data[1].min(5);
                        time_signatures.push(TimeSignature::new(numerator, denominator));
                    }
                    _ => {}
                }
            }
            0xF0 | 0xF7 => {
                let len = reader.var_len().map_err(|e| offset_error(e, base))? as usize;
                reader.take(len).map_err(|e| offset_error(e, base))?;
            }
            _ => {
                let data_len = MidiEvent::data_len(status);
                if reader.pos + data_len > body.len() {
                    // Cut-off trailing message
                    break;
                }
                let mut message = [status, 0, 0];
                message[1..=data_len].copy_from_slice(reader.take(data_len)?);

                match MidiEvent::from_bytes(&message[..=data_len]) {
                    Some(MidiEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    }) => events.push(RawEvent {
                        ticks,
                        kind: RawKind::NoteOn {
                            key: (channel, note),
                            velocity,
                        },
                    }),
                    Some(MidiEvent::NoteOff { channel, note }) => events.push(RawEvent {
                        ticks,
                        kind: RawKind::NoteOff {
                            key: (channel, note),
                        },
                    }),
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Errors from a track body carry positions relative to the whole file
fn offset_error(error: TrackError, base: usize) -> TrackError {
    match error {
        TrackError::Truncated(pos) => TrackError::Truncated(base + pos),
        TrackError::InvalidVarLen(pos) => TrackError::InvalidVarLen(base + pos),
        other => other,
    }
}

fn build_notes(
    mut events: Vec<RawEvent>,
    time_signature: Option<TimeSignature>,
    ticks_per_beat: u16,
) -> ParsedTrack {
    // Stable: simultaneous events keep file order
    events.sort_by_key(|e| e.ticks);

    let tpb = ticks_per_beat as f64;
    let mut tempo = DEFAULT_TEMPO_US;
    let mut last_ticks = 0u64;
    let mut seconds = 0.0;
    let mut max_ticks = 0u64;
    let mut order = 0usize;

    let mut active: HashMap<(u8, u8), ActiveNote> = HashMap::new();
    let mut notes: Vec<(f64, AccompanimentNote)> = Vec::new();

    for event in &events {
        if event.ticks > last_ticks {
            seconds += (event.ticks - last_ticks) as f64 / tpb * (tempo as f64 / 1_000_000.0);
            last_ticks = event.ticks;
        }

        match event.kind {
            RawKind::Tempo(us) => tempo = us.max(1),
            RawKind::NoteOn { key, velocity } => {
                active.insert(
                    key,
                    ActiveNote {
                        velocity,
                        start_ticks: event.ticks,
                        start_seconds: seconds,
                        order,
                    },
                );
                order += 1;
            }
            RawKind::NoteOff { key } => {
                if let Some(start) = active.remove(&key) {
                    let duration_ticks = (event.ticks - start.start_ticks).max(1);
                    let end_seconds = start.start_seconds + (seconds - start.start_seconds).max(MIN_NOTE_SECONDS);
                    notes.push((
                        end_seconds,
                        AccompanimentNote::new(
                            key.1,
                            start.velocity,
                            start.start_ticks as f64 / tpb,
                            duration_ticks as f64 / tpb,
                        ),
                    ));
                    max_ticks = max_ticks.max(start.start_ticks + duration_ticks);
                }
            }
        }
    }

    // Notes never switched off get a default half beat
    let mut unmatched: Vec<((u8, u8), ActiveNote)> = active.into_iter().collect();
    unmatched.sort_by_key(|(_, n)| n.order);
    let default_ticks = ((tpb * 0.5).round() as u64).max(1);
    for ((_, pitch), start) in unmatched {
        notes.push((
            start.start_seconds + 0.5,
            AccompanimentNote::new(
                pitch,
                start.velocity,
                start.start_ticks as f64 / tpb,
                (default_ticks as f64 / tpb).max(MIN_UNMATCHED_BEATS),
            ),
        ));
        max_ticks = max_ticks.max(start.start_ticks + default_ticks);
    }

    notes.sort_by(|a, b| a.1.start_beats.total_cmp(&b.1.start_beats));
    let duration_seconds = notes.iter().map(|(end, _)| *end).fold(0.0, f64::max);
    let notes: Vec<AccompanimentNote> = notes.into_iter().map(|(_, n)| n).collect();

    max_ticks = max_ticks.max(last_ticks);
    let total_beats = max_ticks as f64 / tpb;
    let time_signature = time_signature.unwrap_or_default();
    let quarters_per_bar = time_signature.quarters_per_bar();
    let bar_estimate = if quarters_per_bar > 0.0 {
        total_beats / quarters_per_bar
    } else {
        0.0
    };

    ParsedTrack {
        notes,
        total_beats,
        bar_estimate,
        time_signature,
        ticks_per_beat,
        duration_seconds,
    }
}

/// Builds SMF bytes for tests
#[cfg(test)]
pub(crate) mod builder {
    pub fn var_len(mut value: u32) -> Vec<u8> {
        let mut out = vec![(value & 0x7F) as u8];
        value >>= 7;
        while value > 0 {
            out.insert(0, (value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
        out
    }

    pub fn file(division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = b"MThd".to_vec();
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&(if tracks.len() > 1 { 1u16 } else { 0 }).to_be_bytes());
        out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        for body in tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    /// (delta, raw bytes) pairs, terminated with End of Track
    pub fn track(events: &[(u32, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (delta, bytes) in events {
            out.extend(var_len(*delta));
            out.extend_from_slice(bytes);
        }
        out.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::builder::{file, track, var_len};
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_var_len_encoding() {
        assert_eq!(var_len(0), vec![0x00]);
        assert_eq!(var_len(0x7F), vec![0x7F]);
        assert_eq!(var_len(0x80), vec![0x81, 0x00]);
        assert_eq!(var_len(480), vec![0x83, 0x60]);
    }

    #[test]
    fn test_single_note() {
        let bytes = file(
            480,
            &[track(&[(0, &[0x90, 60, 100]), (480, &[0x80, 60, 0])])],
        );
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.ticks_per_beat, 480);
        assert_eq!(parsed.notes.len(), 1);
        let note = parsed.notes[0];
        assert_eq!(note.pitch, 60);
        assert_eq!(note.velocity, 100);
        assert!(approx(note.start_beats, 0.0));
        assert!(approx(note.duration_beats, 1.0));
        assert!(approx(parsed.total_beats, 1.0));
        assert!(approx(parsed.bar_estimate, 0.25));
        assert!(approx(parsed.duration_seconds, 0.5));
        assert_eq!(parsed.time_signature, TimeSignature::four_four());
    }

    #[test]
    fn test_running_status_and_velocity_zero_off() {
        // Second and third events reuse 0x90; velocity 0 ends the note
        let bytes = file(
            96,
            &[track(&[
                (0, &[0x90, 62, 80]),
                (48, &[62, 0]),
                (48, &[64, 90]),
                (96, &[64, 0]),
            ])],
        );
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.notes.len(), 2);
        assert!(approx(parsed.notes[0].duration_beats, 0.5));
        assert!(approx(parsed.notes[1].start_beats, 1.0));
        assert!(approx(parsed.notes[1].duration_beats, 1.0));
        assert!(approx(parsed.total_beats, 2.0));
    }

    #[test]
    fn test_tempo_change_affects_seconds_not_beats() {
        // 60 bpm = 1_000_000 us per quarter
        let bytes = file(
            100,
            &[track(&[
                (0, &[0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40]),
                (0, &[0x90, 60, 100]),
                (200, &[0x80, 60, 0]),
            ])],
        );
        let parsed = parse(&bytes).unwrap();

        assert!(approx(parsed.notes[0].duration_beats, 2.0));
        assert!(approx(parsed.duration_seconds, 2.0));
    }

    #[test]
    fn test_time_signature_meta() {
        // 6/8: denominator as power of two
        let bytes = file(
            480,
            &[track(&[
                (0, &[0xFF, 0x58, 0x04, 6, 3, 24, 8]),
                (0, &[0x90, 60, 100]),
                (1440, &[0x80, 60, 0]),
            ])],
        );
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.time_signature, TimeSignature::six_eight());
        // 3 quarters of 6/8 is one bar
        assert!(approx(parsed.bar_estimate, 1.0));
    }

    #[test]
    fn test_unmatched_note_gets_default_length() {
        let bytes = file(480, &[track(&[(240, &[0x91, 67, 70])])]);
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.notes.len(), 1);
        assert!(approx(parsed.notes[0].start_beats, 0.5));
        assert!(approx(parsed.notes[0].duration_beats, 0.5));
        assert!(approx(parsed.total_beats, 1.0));
    }

    #[test]
    fn test_unmatched_note_minimum_quarter_beat() {
        // One tick per beat: the default length is at least one whole tick
        let bytes = file(1, &[track(&[(0, &[0x90, 60, 70])])]);
        let parsed = parse(&bytes).unwrap();
        assert!(approx(parsed.notes[0].duration_beats, 1.0));

        let bytes = file(8, &[track(&[(0, &[0x90, 60, 70])])]);
        let parsed = parse(&bytes).unwrap();
        assert!(approx(parsed.notes[0].duration_beats, 0.5));
    }

    #[test]
    fn test_tracks_are_merged_and_sorted() {
        let bytes = file(
            480,
            &[
                track(&[(960, &[0x90, 48, 100]), (480, &[0x80, 48, 0])]),
                track(&[(0, &[0x91, 72, 100]), (240, &[0x81, 72, 0])]),
            ],
        );
        let parsed = parse(&bytes).unwrap();

        let pitches: Vec<u8> = parsed.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![72, 48]);
        assert!(approx(parsed.total_beats, 3.0));
    }

    #[test]
    fn test_same_pitch_on_different_channels() {
        let bytes = file(
            480,
            &[track(&[
                (0, &[0x90, 60, 100]),
                (0, &[0x91, 60, 50]),
                (480, &[0x80, 60, 0]),
                (480, &[0x81, 60, 0]),
            ])],
        );
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.notes.len(), 2);
        let mut durations: Vec<f64> = parsed.notes.iter().map(|n| n.duration_beats).collect();
        durations.sort_by(f64::total_cmp);
        assert!(approx(durations[0], 1.0));
        assert!(approx(durations[1], 2.0));
    }

    #[test]
    fn test_sysex_and_program_change_are_skipped() {
        let bytes = file(
            480,
            &[track(&[
                (0, &[0xF0, 0x03, 0x7E, 0x7F, 0xF7]),
                (0, &[0xC0, 5]),
                (0, &[0x90, 60, 100]),
                (480, &[0x80, 60, 0]),
            ])],
        );
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.notes.len(), 1);
    }

    #[test]
    fn test_file_without_notes_is_not_playable() {
        let bytes = file(480, &[track(&[(0, &[0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20])])]);
        let parsed = parse(&bytes).unwrap();
        assert!(!parsed.is_playable());
        assert_eq!(parsed.info().note_count, 0);
    }

    #[test]
    fn test_rejects_bad_header() {
        assert!(matches!(parse(b"RIFF"), Err(TrackError::InvalidHeader(_))));
        assert!(matches!(parse(&[]), Err(TrackError::InvalidHeader(_))));

        let mut bytes = file(480, &[]);
        bytes[7] = 7;
        assert!(matches!(parse(&bytes), Err(TrackError::InvalidHeader(_))));
    }

    #[test]
    fn test_rejects_smpte_division() {
        let bytes = file(0xE728, &[track(&[])]);
        assert!(matches!(parse(&bytes), Err(TrackError::SmpteUnsupported)));
    }

    #[test]
    fn test_rejects_truncated_track() {
        let mut bytes = file(480, &[track(&[(0, &[0x90, 60, 100])])]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(parse(&bytes), Err(TrackError::Truncated(_))));
    }

    #[test]
    fn test_running_status_survives_meta_and_sysex() {
        let bytes = file(
            480,
            &[track(&[
                (0, &[0x90, 60, 100]),
                (240, &[0xFF, 0x06, 0x01, b'A']),
                (0, &[0xF0, 0x01, 0xF7]),
                (240, &[60, 0]),
            ])],
        );
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.notes.len(), 1);
        assert!(approx(parsed.notes[0].duration_beats, 1.0));
    }

    #[test]
    fn test_rejects_track_longer_than_timeline() {
        // One tick per beat and the largest four-byte delta
        let bytes = file(
            1,
            &[track(&[
                (0x0FFF_FFFF, &[0x90, 60, 100]),
                (1, &[0x80, 60, 0]),
            ])],
        );
        assert!(matches!(
            parse(&bytes),
            Err(TrackError::TrackTooLong { max: MAX_TIMELINE_BEATS, .. })
        ));

        // Right at the limit still loads
        let limit = MAX_TIMELINE_BEATS as u32;
        let bytes = file(
            1,
            &[track(&[(limit - 1, &[0x90, 60, 100]), (1, &[0x80, 60, 0])])],
        );
        let parsed = parse(&bytes).unwrap();
        assert!(approx(parsed.total_beats, MAX_TIMELINE_BEATS as f64));
    }

    #[test]
    fn test_rejects_running_status_without_status() {
        let bytes = file(480, &[track(&[(0, &[60, 100])])]);
        assert!(matches!(
            parse(&bytes),
            Err(TrackError::InvalidRunningStatus(_))
        ));
    }
}
