// Shared helpers for integration tests: a tiny Standard MIDI File writer

#![allow(dead_code)]

pub const TICKS_PER_BEAT: u16 = 480;

fn var_len(mut value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push(((value & 0x7F) as u8) | 0x80);
        value >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Format-0 file with one track built from `(delta_ticks, event_bytes)` pairs
pub fn smf(events: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut track = Vec::new();
    for (delta, bytes) in events {
        track.extend(var_len(*delta));
        track.extend(bytes);
    }
    track.extend([0x00, 0xFF, 0x2F, 0x00]);

    let mut file = b"MThd".to_vec();
    file.extend(6u32.to_be_bytes());
    file.extend(0u16.to_be_bytes());
    file.extend(1u16.to_be_bytes());
    file.extend(TICKS_PER_BEAT.to_be_bytes());
    file.extend(b"MTrk");
    file.extend((track.len() as u32).to_be_bytes());
    file.extend(track);
    file
}

/// Notes as `(start_beats, duration_beats, pitch)`, sorted by start
pub fn notes(notes: &[(f64, f64, u8)]) -> Vec<u8> {
    let tpb = TICKS_PER_BEAT as f64;
    let mut timed: Vec<(u32, Vec<u8>)> = Vec::new();
    for &(start, duration, pitch) in notes {
        let on = (start * tpb).round() as u32;
        let off = ((start + duration) * tpb).round() as u32;
        timed.push((on, vec![0x90, pitch, 100]));
        timed.push((off, vec![0x80, pitch, 0]));
    }
    timed.sort_by_key(|(tick, _)| *tick);

    let mut last = 0;
    let events: Vec<(u32, Vec<u8>)> = timed
        .into_iter()
        .map(|(tick, bytes)| {
            let delta = tick - last;
            last = tick;
            (delta, bytes)
        })
        .collect();
    smf(&events)
}
