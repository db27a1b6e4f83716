// Sequencer module
// Transport, beat scheduling, speed trainer and accompaniment sync

pub mod accompaniment;
pub mod beat_timeline;
pub mod inspector;
pub mod note;
pub mod observer;
pub mod practice_queue;
pub mod scheduler;
pub mod speed_trainer;
pub mod timeline;
pub mod transport;

pub use accompaniment::{AccompanimentEvent, AccompanimentState, TrackInfo, compute_note_time};
pub use beat_timeline::{BeatTimeline, TimelineEntry};
pub use inspector::{BeatHistory, SyncSnapshot};
pub use note::AccompanimentNote;
pub use observer::{BeatInfo, LogObserver, ObserverSet, TransportObserver};
pub use practice_queue::{Exercise, ExerciseTempo, PracticeQueue, Section};
pub use scheduler::{Metronome, SchedulerSettings};
pub use speed_trainer::{SpeedTrainerConfig, StepResult, consider_step};
pub use timeline::{Tempo, TimeSignature, seconds_per_beat};
pub use transport::{ClickPattern, HorizonSettings, TransportSnapshot, TransportState};
