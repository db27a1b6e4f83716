// Voice - One scheduled accompaniment note on the fallback synth

use super::envelope::{AdsrEnvelope, AdsrParams};
use super::oscillator::{Oscillator, SimpleOscillator, WaveformType, midi_to_frequency};

/// Synth voice with a start delay and a fixed hold time, both in samples
pub struct Voice {
    oscillator: SimpleOscillator,
    envelope: AdsrEnvelope,
    note: u8,
    gain: f32,
    /// Samples left before the note starts
    delay: u64,
    /// Samples left before the note is released
    hold: u64,
    started: bool,
    /// Absolute start sample, used to pick a voice to steal
    start_sample: u64,
}

impl Voice {
    pub fn new(waveform: WaveformType, adsr: AdsrParams, sample_rate: f32) -> Self {
        Self {
            oscillator: SimpleOscillator::new(waveform, sample_rate),
            envelope: AdsrEnvelope::new(adsr, sample_rate),
            note: 0,
            gain: 0.0,
            delay: 0,
            hold: 0,
            started: false,
            start_sample: 0,
        }
    }

    /// Arm the voice: it sounds after `delay` samples and releases after `hold` more
    pub fn trigger(&mut self, note: u8, gain: f32, delay: u64, hold: u64, start_sample: u64) {
        self.note = note;
        self.gain = gain;
        self.delay = delay;
        self.hold = hold.max(1);
        self.start_sample = start_sample;
        self.started = false;
        self.envelope.reset();
        self.oscillator.set_frequency(midi_to_frequency(note));
        self.oscillator.reset();
    }

    /// Let go of the note; the release tail still plays
    pub fn release(&mut self) {
        if !self.started {
            // Never sounded: drop it
            self.delay = 0;
            self.hold = 0;
            self.started = true;
            self.envelope.reset();
            return;
        }
        self.hold = 0;
        self.envelope.note_off();
    }

    /// Waiting to start or still sounding
    pub fn is_active(&self) -> bool {
        !self.started || self.envelope.is_active()
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

        let level = self.envelope.process();
        self.oscillator.next_sample() * level * self.gain
    }
}
