pub mod bank;
pub mod engine;
pub mod loader;

pub use bank::{Instrument, InstrumentBank, InstrumentSpec};
pub use engine::SamplerVoice;
pub use loader::{Sample, SampleError, SampleResult, load_sample};
