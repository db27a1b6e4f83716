// MIDI - Standard MIDI File loading for the accompaniment

pub mod event;
pub mod smf;

pub use smf::{ParsedTrack, TrackError, TrackResult, parse};

use std::path::Path;

/// Read and parse a `.mid` file
pub fn load_file(path: &Path) -> TrackResult<ParsedTrack> {
    let bytes = std::fs::read(path)?;
    parse(&bytes)
}
