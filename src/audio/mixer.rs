// Mixer - Turns timed sound commands into mono samples
//
// Shared by the cpal callback and the offline renderer. Voices are kept in
// vectors allocated once up front; handling a command never grows them.

use crate::audio::dsp_utils::{OnePoleSmoother, flush_denormals_to_zero, soft_clip};
use crate::audio::parameters::SharedGain;
use crate::messaging::command::SoundCommand;
use crate::sampler::bank::Instrument;
use crate::sampler::engine::SamplerVoice;
use crate::synth::SynthSettings;
use crate::synth::click::{ClickSounds, ClickVoice};
use crate::synth::voice::Voice;

pub const MAX_CLICK_VOICES: usize = 16;
pub const MAX_NOTE_VOICES: usize = 32;

/// Gain smoothing time for master volume changes
const MASTER_SMOOTHING_MS: f32 = 10.0;

enum NoteVoice {
    Synth(Voice),
    Sampled(SamplerVoice),
}

impl NoteVoice {
    fn is_active(&self) -> bool {
        match self {
            NoteVoice::Synth(v) => v.is_active(),
            NoteVoice::Sampled(v) => v.is_active(),
        }
    }

    fn release(&mut self) {
        match self {
            NoteVoice::Synth(v) => v.release(),
            NoteVoice::Sampled(v) => v.release(),
        }
    }

    fn start_sample(&self) -> u64 {
        match self {
            NoteVoice::Synth(v) => v.start_sample(),
            NoteVoice::Sampled(v) => v.start_sample(),
        }
    }

    fn next_sample(&mut self) -> f32 {
        match self {
            NoteVoice::Synth(v) => v.next_sample(),
            NoteVoice::Sampled(v) => v.next_sample(),
        }
    }
}

pub struct Mixer {
    sample_rate: f32,
    clicks: ClickSounds,
    click_voices: Vec<ClickVoice>,
    note_voices: Vec<NoteVoice>,
    synth: SynthSettings,
    master: SharedGain,
    smoother: OnePoleSmoother,
    /// Absolute sample index of the next rendered frame
    position: u64,
}

impl Mixer {
    pub fn new(sample_rate: f32, master: SharedGain, synth: SynthSettings) -> Self {
        let smoother = OnePoleSmoother::new(master.get(), MASTER_SMOOTHING_MS, sample_rate);
        Self {
            sample_rate,
            clicks: ClickSounds::new(sample_rate),
            click_voices: Vec::with_capacity(MAX_CLICK_VOICES),
            note_voices: Vec::with_capacity(MAX_NOTE_VOICES),
            synth,
            master,
            smoother,
            position: 0,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn active_voices(&self) -> usize {
        self.click_voices.len() + self.note_voices.iter().filter(|v| v.is_active()).count()
    }

    /// Apply one command. Events already in the past start immediately.
    pub fn handle(&mut self, command: SoundCommand) {
        match command {
            SoundCommand::Click {
                at_sample,
                accented,
                mode,
            } => {
                if self.click_voices.len() >= MAX_CLICK_VOICES {
                    self.click_voices.remove(0);
                }
                let delay = at_sample.saturating_sub(self.position);
                self.click_voices.push(ClickVoice::new(mode, accented, delay));
            }
            SoundCommand::Note {
                at_sample,
                hold_samples,
                pitch,
                gain,
                instrument,
            } => {
                let delay = at_sample.saturating_sub(self.position);
                let mut voice = match instrument {
                    Instrument::Synth => NoteVoice::Synth(Voice::new(
                        self.synth.waveform,
                        self.synth.adsr,
                        self.sample_rate,
                    )),
                    Instrument::Sampled(sample) => {
                        NoteVoice::Sampled(SamplerVoice::new(sample, self.sample_rate))
                    }
                };
                match &mut voice {
                    NoteVoice::Synth(v) => v.trigger(pitch, gain, delay, hold_samples, at_sample),
                    NoteVoice::Sampled(v) => v.trigger(pitch, gain, delay, hold_samples, at_sample),
                }
                self.push_note(voice);
            }
            SoundCommand::SilenceNotes => {
                for voice in &mut self.note_voices {
                    voice.release();
                }
            }
        }
    }

    fn push_note(&mut self, voice: NoteVoice) {
        if self.note_voices.len() >= MAX_NOTE_VOICES {
            self.note_voices.retain(NoteVoice::is_active);
        }
        if self.note_voices.len() >= MAX_NOTE_VOICES {
            // Steal the oldest voice
            let oldest = self
                .note_voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.start_sample())
                .map(|(i, _)| i);
            if let Some(index) = oldest {
                self.note_voices.swap_remove(index);
            }
        }
        self.note_voices.push(voice);
    }

    /// Render one frame
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let mut sum = 0.0;
        for click in &mut self.click_voices {
            if let Some(s) = click.next_sample(&self.clicks) {
                sum += s;
            }
        }
        for voice in &mut self.note_voices {
            sum += voice.next_sample();
        }

        let gain = self.smoother.process(self.master.get());
        self.position += 1;
        soft_clip(flush_denormals_to_zero(sum * gain))
    }

    /// Render a block of mono frames and drop finished voices
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
        self.drop_finished();
    }

    /// Remove voices that will not sound again; call once per block
    pub fn drop_finished(&mut self) {
        self.click_voices.retain(|v| !v.is_finished(&self.clicks));
        self.note_voices.retain(NoteVoice::is_active);
    }
}
