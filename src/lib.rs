// Practice metronome - Library exports for the binary and integration tests

pub mod audio;
pub mod config;
pub mod driver;
pub mod messaging;
pub mod midi;
pub mod sampler;
pub mod sequencer;
pub mod synth;

// Re-export commonly used types for convenience
pub use audio::engine::{AudioEngine, CpalFactory, EngineOptions};
pub use audio::export::{AudioExporter, ExportSettings, ExportSummary};
pub use audio::offline::{OfflineBackend, OfflineFactory};
pub use audio::{AudioBackend, AudioError, AudioResult, BackendFactory, ClickMode};
pub use config::{ConfigError, MetronomeConfig};
pub use driver::{ControlCommand, Driver, Feedback};
pub use midi::{ParsedTrack, TrackError};
pub use sampler::InstrumentBank;
pub use sequencer::{
    AccompanimentState, BeatHistory, BeatInfo, ClickPattern, Exercise, ExerciseTempo, Metronome,
    PracticeQueue, SchedulerSettings, SpeedTrainerConfig, SyncSnapshot, Tempo, TimeSignature,
    TransportObserver, TransportState,
};
