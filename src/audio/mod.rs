// Audio - Clock/renderer backends, the shared mixer and WAV export

pub mod backend;
pub mod dsp_utils;
pub mod engine;
pub mod export;
pub mod mixer;
pub mod offline;
pub mod parameters;
pub mod timing;

pub use backend::{
    AudioBackend, AudioError, AudioRenderer, AudioResult, BackendFactory, ClickMode, ClockSource,
};
