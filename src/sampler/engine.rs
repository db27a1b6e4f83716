// Sampler voice - Plays a mono sample repitched from its root note

use crate::sampler::loader::Sample;
use crate::synth::envelope::{AdsrEnvelope, AdsrParams};
use std::sync::Arc;

/// Envelope that leaves the recorded attack alone and only fades the tail
fn sampler_envelope() -> AdsrParams {
    AdsrParams::new(0.002, 0.001, 1.0, 0.08)
}

pub struct SamplerVoice {
    sample: Arc<Sample>,
    envelope: AdsrEnvelope,
    position: f64,
    pitch_step: f64,
    output_rate: f32,
    note: u8,
    gain: f32,
    delay: u64,
    hold: u64,
    started: bool,
    finished: bool,
    start_sample: u64,
}

impl SamplerVoice {
    pub fn new(sample: Arc<Sample>, output_rate: f32) -> Self {
        Self {
            sample,
            envelope: AdsrEnvelope::new(sampler_envelope(), output_rate),
            position: 0.0,
            pitch_step: 1.0,
            output_rate,
            note: 0,
            gain: 0.0,
            delay: 0,
            hold: 0,
            started: true,
            finished: true,
            start_sample: 0,
        }
    }

    /// Playback rate for a note: the pitch ratio from the root note, corrected
    /// for the file's sample rate
    pub fn pitch_step_for(sample: &Sample, note: u8, output_rate: f32) -> f64 {
        let semitones = note as f64 - sample.root_note as f64;
        2.0_f64.powf(semitones / 12.0) * sample.sample_rate as f64 / output_rate as f64
    }

    pub fn trigger(&mut self, note: u8, gain: f32, delay: u64, hold: u64, start_sample: u64) {
        self.pitch_step = Self::pitch_step_for(&self.sample, note, self.output_rate);
        self.position = 0.0;
        self.note = note;
        self.gain = gain;
        self.delay = delay;
        self.hold = hold.max(1);
        self.started = false;
        self.finished = false;
        self.start_sample = start_sample;
        self.envelope.reset();
    }

    pub fn release(&mut self) {
        if !self.started {
            self.finished = true;
            self.started = true;
            return;
        }
        self.hold = 0;
        self.envelope.note_off();
    }

    pub fn is_active(&self) -> bool {
        !self.finished
    }

    pub fn is_pending(&self) -> bool {
        !self.started
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.finished {
            return 0.0;
        }
        if !self.started {
            if self.delay > 0 {
                self.delay -= 1;
                return 0.0;
            }
            self.started = true;
            self.envelope.note_on();
        }

        if self.hold > 0 {
            self.hold -= 1;
            if self.hold == 0 {
                self.envelope.note_off();
            }
        }

        let data = &self.sample.data;
        let index = self.position as usize;
        if index >= data.len() {
            self.finished = true;
            return 0.0;
        }

        // Linear interpolation between neighbouring frames
        let frac = self.position.fract() as f32;
        let a = data[index];
        let b = data.get(index + 1).copied().unwrap_or(0.0);
        let raw = a + (b - a) * frac;
        self.position += self.pitch_step;

        let level = self.envelope.process();
        if !self.envelope.is_active() {
            self.finished = true;
        }
        raw * level * self.gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, rate: u32, root: u8) -> Arc<Sample> {
        let data = (0..len).map(|i| i as f32 / len as f32).collect();
        Arc::new(Sample::new("ramp", data, rate, root))
    }

    #[test]
    fn test_pitch_step() {
        let sample = ramp(10, 48000, 60);
        assert_eq!(SamplerVoice::pitch_step_for(&sample, 60, 48000.0), 1.0);
        assert!((SamplerVoice::pitch_step_for(&sample, 72, 48000.0) - 2.0).abs() < 1e-9);
        assert!((SamplerVoice::pitch_step_for(&sample, 60, 24000.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_voice_is_idle() {
        let voice = SamplerVoice::new(ramp(10, 48000, 60), 48000.0);
        assert!(!voice.is_active());
    }

    #[test]
    fn test_plays_to_end_of_sample() {
        let mut voice = SamplerVoice::new(ramp(100, 48000, 60), 48000.0);
        voice.trigger(72, 1.0, 5, 48000, 0);

        for _ in 0..5 {
            assert_eq!(voice.next_sample(), 0.0);
        }
        // Twice the speed: 50 output samples cover the file
        for _ in 0..50 {
            voice.next_sample();
        }
        assert!(voice.is_active());
        voice.next_sample();
        assert!(!voice.is_active());
    }

    #[test]
    fn test_release_fades_out() {
        let mut voice = SamplerVoice::new(ramp(48000, 48000, 60), 48000.0);
        voice.trigger(60, 1.0, 0, 10, 0);

        // 80 ms release after a 10 sample hold
        for _ in 0..(10 + 3840) {
            voice.next_sample();
        }
        assert!(!voice.is_active());
    }
}
