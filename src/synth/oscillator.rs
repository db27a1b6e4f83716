// Oscillators - Waveform generators for clicks and the fallback accompaniment synth

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

pub trait Oscillator {
    fn next_sample(&mut self) -> f32;
    fn set_frequency(&mut self, freq: f32);
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformType {
    Sine,
    Square,
    Saw,
    #[default]
    Triangle,
}

/// Equal-tempered frequency of a MIDI note (A4 = 69 = 440 Hz)
#[inline]
pub fn midi_to_frequency(note: u8) -> f32 {
    440.0 * 2_f32.powf((note as f32 - 69.0) / 12.0)
}

/// Naive (non band-limited) oscillator; fine for short clicks and soft pads
pub struct SimpleOscillator {
    waveform: WaveformType,
    phase: f32,
    phase_increment: f32,
    sample_rate: f32,
}

impl SimpleOscillator {
    pub fn new(waveform: WaveformType, sample_rate: f32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate,
        }
    }

    pub fn waveform(&self) -> WaveformType {
        self.waveform
    }
}

impl Oscillator for SimpleOscillator {
    fn next_sample(&mut self) -> f32 {
        let p = self.phase;
        let sample = match self.waveform {
            WaveformType::Sine => (p * 2.0 * PI).sin(),
            WaveformType::Square => {
                if p < 0.5 { 1.0 } else { -1.0 }
            }
            WaveformType::Saw => (p * 2.0) - 1.0,
            // Starts at zero and rises, like the sine
            WaveformType::Triangle => {
                if p < 0.25 {
                    p * 4.0
                } else if p < 0.75 {
                    2.0 - p * 4.0
                } else {
                    p * 4.0 - 4.0
                }
            }
        };

        self.phase += self.phase_increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    fn set_frequency(&mut self, freq: f32) {
        self.phase_increment = (freq / self.sample_rate).clamp(0.0, 0.5);
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}
