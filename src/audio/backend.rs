// Audio backend - Clock and renderer seams between the scheduler and the sound output
// The realtime engine and the offline renderer both sit behind these traits

use crate::sequencer::accompaniment::AccompanimentEvent;
use serde::Serialize;
use thiserror::Error;

/// Audio-related errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No audio device found")]
    NoDevice,

    #[error("Audio configuration failed: {0}")]
    Config(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream failed: {0}")]
    Stream(String),

    #[error("Audio backend unavailable")]
    Unavailable,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Which click timbre to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClickMode {
    Normal,
    CountIn,
}

/// Monotonic audio clock, in seconds
pub trait ClockSource {
    fn now(&self) -> f64;

    /// Make sure the clock is advancing (a suspended device is resumed)
    fn resume(&mut self) -> AudioResult<()>;
}

/// Receives sound events scheduled ahead of the clock.
///
/// Times are absolute clock seconds. Implementations must not block; a
/// dropped event is logged, never reported back to the scheduler.
pub trait AudioRenderer {
    fn schedule_click(&mut self, time: f64, accented: bool, mode: ClickMode);

    fn schedule_note(&mut self, event: &AccompanimentEvent, instrument_id: &str);

    /// Stop every accompaniment voice; clicks already queued still play
    fn silence_notes(&mut self);

    /// Release the device; the backend is unusable afterwards
    fn close(&mut self);
}

/// A clock and a renderer sharing one device
pub trait AudioBackend: ClockSource + AudioRenderer {}

impl<T: ClockSource + AudioRenderer> AudioBackend for T {}

/// Opens a backend on demand.
///
/// The metronome calls `open` lazily on start and drops the backend on panic,
/// so a later start reopens the device.
pub trait BackendFactory {
    type Backend: AudioBackend;

    fn open(&mut self) -> AudioResult<Self::Backend>;
}
