// Audio export - Offline rendering of a recorded session to WAV
//
// The recording from the offline backend is replayed through the same mixer
// the realtime engine uses: each call is handed to the mixer once the render
// position reaches the clock time at which the scheduler issued it.

use crate::audio::backend::AudioResult;
use crate::audio::mixer::Mixer;
use crate::audio::offline::{RecordedCall, RenderCall};
use crate::audio::parameters::SharedGain;
use crate::messaging::command::SoundCommand;
use crate::sampler::bank::InstrumentBank;
use crate::synth::SynthSettings;
use hound::{WavSpec, WavWriter};
use std::path::{Path, PathBuf};

/// Audio export settings
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub output_path: PathBuf,
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Number of channels (1=mono, 2=stereo)
    pub channels: u16,
    pub master_volume: f32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("practice.wav"),
            sample_rate: 44100,
            channels: 2,
            master_volume: 0.8,
        }
    }
}

/// What was written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSummary {
    pub frames: u64,
    pub clicks: usize,
    pub notes: usize,
    pub peak: f32,
}

/// Renders recorded sessions to 16-bit PCM WAV files
pub struct AudioExporter {
    settings: ExportSettings,
}

impl AudioExporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Render `seconds` of audio from the recorded calls
    pub fn export(
        &self,
        calls: &[RecordedCall],
        seconds: f64,
        bank: &InstrumentBank,
        synth: SynthSettings,
    ) -> AudioResult<ExportSummary> {
        let rate = self.settings.sample_rate.max(1);
        let channels = self.settings.channels.clamp(1, 2);
        let total_frames = (seconds.max(0.0) * rate as f64).round() as u64;

        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&self.settings.output_path, spec)?;

        let mut ordered: Vec<&RecordedCall> = calls.iter().collect();
        ordered.sort_by(|a, b| a.issued_at.total_cmp(&b.issued_at));

        let to_samples = |t: f64| (t.max(0.0) * rate as f64).round() as u64;
        let mut mixer = Mixer::new(rate as f32, SharedGain::new(self.settings.master_volume), synth);
        let mut summary = ExportSummary {
            frames: total_frames,
            clicks: 0,
            notes: 0,
            peak: 0.0,
        };

        let mut pending = ordered.into_iter().peekable();
        for frame in 0..total_frames {
            while let Some(call) = pending.next_if(|c| to_samples(c.issued_at) <= frame) {
                let command = match &call.call {
                    RenderCall::Click {
                        time,
                        accented,
                        mode,
                    } => {
                        summary.clicks += 1;
                        SoundCommand::Click {
                            at_sample: to_samples(*time),
                            accented: *accented,
                            mode: *mode,
                        }
                    }
                    RenderCall::Note {
                        event,
                        instrument_id,
                    } => {
                        summary.notes += 1;
                        SoundCommand::Note {
                            at_sample: to_samples(event.start_time),
                            hold_samples: to_samples(event.duration_secs),
                            pitch: event.pitch,
                            gain: event.gain,
                            instrument: bank.resolve(instrument_id),
                        }
                    }
                    RenderCall::SilenceNotes | RenderCall::Close => SoundCommand::SilenceNotes,
                };
                mixer.handle(command);
            }

            let sample = mixer.next_sample();
            summary.peak = summary.peak.max(sample.abs());
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(value)?;
            }

            if frame % 1024 == 1023 {
                mixer.drop_finished();
            }
        }

        writer.finalize()?;
        log::info!(
            "Exported {:.2}s to {} ({} clicks, {} notes)",
            seconds,
            display(&self.settings.output_path),
            summary.clicks,
            summary.notes
        );
        Ok(summary)
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
