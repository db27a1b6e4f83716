// Sound commands - Scheduler → audio thread
// Times are absolute sample positions on the audio clock

use crate::audio::backend::ClickMode;
use crate::sampler::bank::Instrument;

#[derive(Debug, Clone, PartialEq)]
pub enum SoundCommand {
    Click {
        at_sample: u64,
        accented: bool,
        mode: ClickMode,
    },
    Note {
        at_sample: u64,
        hold_samples: u64,
        pitch: u8,
        gain: f32,
        instrument: Instrument,
    },
    /// Release every accompaniment voice, pending ones included
    SilenceNotes,
}

impl SoundCommand {
    /// Start position, for commands that have one
    pub fn at_sample(&self) -> Option<u64> {
        match self {
            SoundCommand::Click { at_sample, .. } | SoundCommand::Note { at_sample, .. } => {
                Some(*at_sample)
            }
            SoundCommand::SilenceNotes => None,
        }
    }
}
