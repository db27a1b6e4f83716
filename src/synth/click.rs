// Click sounds - Pre-rendered metronome clicks
// Rendered once per sample rate so triggering a click costs nothing in the callback

use super::oscillator::{Oscillator, SimpleOscillator, WaveformType};
use crate::audio::backend::ClickMode;

/// Level the exponential decay reaches at the end of its ramp
const DECAY_FLOOR: f32 = 0.0001;
const ATTACK_SECS: f32 = 0.001;

/// Shape of one click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickTimbre {
    pub waveform: WaveformType,
    pub frequency: f32,
    pub peak: f32,
    /// Time at which the decay reaches DECAY_FLOOR
    pub decay_secs: f32,
    /// Total length of the click
    pub length_secs: f32,
}

impl ClickTimbre {
    /// Bright square click used while playing
    pub fn normal(accented: bool) -> Self {
        Self {
            waveform: WaveformType::Square,
            frequency: if accented { 1800.0 } else { 1200.0 },
            peak: if accented { 0.9 } else { 0.5 },
            decay_secs: 0.06,
            length_secs: 0.07,
        }
    }

    /// Softer, lower triangle click used during the count-in
    pub fn count_in(accented: bool) -> Self {
        Self {
            waveform: WaveformType::Triangle,
            frequency: if accented { 1000.0 } else { 700.0 },
            peak: if accented { 0.95 } else { 0.65 },
            decay_secs: 0.08,
            length_secs: 0.09,
        }
    }

    pub fn for_mode(mode: ClickMode, accented: bool) -> Self {
        match mode {
            ClickMode::Normal => Self::normal(accented),
            ClickMode::CountIn => Self::count_in(accented),
        }
    }

    /// Envelope value `t` seconds into the click: 1 ms linear attack, then an
    /// exponential ramp down to DECAY_FLOOR which is held until the end
    pub fn envelope(&self, t: f32) -> f32 {
        if t < 0.0 || t >= self.length_secs {
            0.0
        } else if t < ATTACK_SECS {
            self.peak * t / ATTACK_SECS
        } else if t < self.decay_secs {
            let progress = (t - ATTACK_SECS) / (self.decay_secs - ATTACK_SECS);
            self.peak * (DECAY_FLOOR / self.peak).powf(progress)
        } else {
            DECAY_FLOOR
        }
    }

    pub fn render(&self, sample_rate: f32) -> Vec<f32> {
        let len = (self.length_secs * sample_rate).round() as usize;
        let mut osc = SimpleOscillator::new(self.waveform, sample_rate);
        osc.set_frequency(self.frequency);

        (0..len)
            .map(|i| osc.next_sample() * self.envelope(i as f32 / sample_rate))
            .collect()
    }
}

/// The four click buffers, indexed by mode and accent
#[derive(Debug, Clone)]
pub struct ClickSounds {
    buffers: [Vec<f32>; 4],
}

impl ClickSounds {
    pub fn new(sample_rate: f32) -> Self {
        let render = |mode, accented| ClickTimbre::for_mode(mode, accented).render(sample_rate);
        Self {
            buffers: [
                render(ClickMode::Normal, false),
                render(ClickMode::Normal, true),
                render(ClickMode::CountIn, false),
                render(ClickMode::CountIn, true),
            ],
        }
    }

    pub fn index(mode: ClickMode, accented: bool) -> usize {
        let base = match mode {
            ClickMode::Normal => 0,
            ClickMode::CountIn => 2,
        };
        base + accented as usize
    }

    pub fn get(&self, index: usize) -> &[f32] {
        self.buffers.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_click(&self, mode: ClickMode, accented: bool) -> &[f32] {
        self.get(Self::index(mode, accented))
    }
}

/// Playback position in one click buffer
#[derive(Debug, Clone, Copy)]
pub struct ClickVoice {
    buffer: usize,
    position: usize,
    delay: u64,
}

impl ClickVoice {
    pub fn new(mode: ClickMode, accented: bool, delay: u64) -> Self {
        Self {
            buffer: ClickSounds::index(mode, accented),
            position: 0,
            delay,
        }
    }

    pub fn is_finished(&self, sounds: &ClickSounds) -> bool {
        self.delay == 0 && self.position >= sounds.get(self.buffer).len()
    }

    /// Next sample; None once the click has finished
    pub fn next_sample(&mut self, sounds: &ClickSounds) -> Option<f32> {
        if self.delay > 0 {
            self.delay -= 1;
            return Some(0.0);
        }
        let sample = sounds.get(self.buffer).get(self.position).copied()?;
        self.position += 1;
        Some(sample)
    }
}
