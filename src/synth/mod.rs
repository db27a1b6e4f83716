// Synthesis - Click sounds and the fallback accompaniment voice

pub mod click;
pub mod envelope;
pub mod oscillator;
pub mod voice;

use envelope::AdsrParams;
use oscillator::WaveformType;
use serde::{Deserialize, Serialize};

/// Sound of the built-in accompaniment synth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthSettings {
    pub waveform: WaveformType,
    pub adsr: AdsrParams,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            waveform: WaveformType::Triangle,
            adsr: AdsrParams::pluck(),
        }
    }
}
