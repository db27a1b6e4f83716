// Audio engine - Realtime cpal output driven by the sample-counter clock
//
// The callback owns the mixer and the consumer end of the sound ring; the
// scheduler side only pushes commands and reads the clock. Everything is
// rendered as f32 mono and converted per frame to the device format.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::audio::backend::{
    AudioError, AudioRenderer, AudioResult, BackendFactory, ClickMode, ClockSource,
};
use crate::audio::mixer::Mixer;
use crate::audio::parameters::SharedGain;
use crate::audio::timing::AudioTiming;
use crate::messaging::channels::{SoundConsumer, SoundProducer, create_sound_channel};
use crate::messaging::command::SoundCommand;
use crate::sampler::bank::InstrumentBank;
use crate::sequencer::accompaniment::AccompanimentEvent;
use crate::synth::SynthSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Running = 0,
    Paused = 1,
    Error = 2,
}

impl From<u8> for StreamStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => StreamStatus::Running,
            1 => StreamStatus::Paused,
            _ => StreamStatus::Error,
        }
    }
}

/// Stream status shared with the error callback
#[derive(Clone)]
struct AtomicStreamStatus(Arc<AtomicU8>);

impl AtomicStreamStatus {
    fn new(status: StreamStatus) -> Self {
        Self(Arc::new(AtomicU8::new(status as u8)))
    }

    fn get(&self) -> StreamStatus {
        StreamStatus::from(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, status: StreamStatus) {
        self.0.store(status as u8, Ordering::Relaxed);
    }
}

/// Options for opening the output device
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub master: SharedGain,
    pub ring_capacity: usize,
    pub synth: SynthSettings,
}

pub struct AudioEngine {
    _device: Device,
    stream: Option<Stream>,
    timing: AudioTiming,
    producer: SoundProducer,
    bank: InstrumentBank,
    status: AtomicStreamStatus,
    dropped: u64,
}

impl AudioEngine {
    pub fn new(options: &EngineOptions, bank: InstrumentBank) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        log::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioError::Config(e.to_string()))?;

        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0 as f32;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        let timing = AudioTiming::new(sample_rate);
        let status = AtomicStreamStatus::new(StreamStatus::Paused);
        let (producer, consumer) = create_sound_channel(options.ring_capacity);
        let mixer = Mixer::new(sample_rate, options.master.clone(), options.synth);

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &config,
                channels,
                consumer,
                mixer,
                timing.clone(),
                status.clone(),
            ),
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &config,
                channels,
                consumer,
                mixer,
                timing.clone(),
                status.clone(),
            ),
            SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &config,
                channels,
                consumer,
                mixer,
                timing.clone(),
                status.clone(),
            ),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
        status.set(StreamStatus::Running);

        log::info!("Audio engine started: {} Hz, {} channels", sample_rate, channels);

        Ok(Self {
            _device: device,
            stream: Some(stream),
            timing,
            producer,
            bank,
            status,
            dropped: 0,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.timing.sample_rate()
    }

    pub fn status(&self) -> StreamStatus {
        self.status.get()
    }

    fn push(&mut self, command: SoundCommand) {
        if self.stream.is_none() {
            return;
        }
        if self.producer.try_push(command).is_err() {
            self.dropped += 1;
            log::warn!("Sound ring full, dropped event ({} so far)", self.dropped);
        }
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut consumer: SoundConsumer,
        mut mixer: Mixer,
        timing: AudioTiming,
        status: AtomicStreamStatus,
    ) -> AudioResult<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let error_status = status.clone();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no I/O, no locks past this point
                    while let Some(command) = consumer.try_pop() {
                        mixer.handle(command);
                    }

                    let mut frames = 0;
                    for frame in data.chunks_mut(channels) {
                        let sample = mixer.next_sample();
                        for out in frame.iter_mut() {
                            *out = T::from_sample(sample);
                        }
                        frames += 1;
                    }
                    mixer.drop_finished();
                    timing.advance(frames);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    error_status.set(StreamStatus::Error);
                },
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))
    }
}

impl ClockSource for AudioEngine {
    fn now(&self) -> f64 {
        self.timing.now_seconds()
    }

    fn resume(&mut self) -> AudioResult<()> {
        let stream = self.stream.as_ref().ok_or(AudioError::Unavailable)?;
        if self.status.get() == StreamStatus::Error {
            return Err(AudioError::Stream("device reported an error".into()));
        }
        stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
        self.status.set(StreamStatus::Running);
        Ok(())
    }
}

impl AudioRenderer for AudioEngine {
    fn schedule_click(&mut self, time: f64, accented: bool, mode: ClickMode) {
        let at_sample = self.timing.seconds_to_samples(time);
        self.push(SoundCommand::Click {
            at_sample,
            accented,
            mode,
        });
    }

    fn schedule_note(&mut self, event: &AccompanimentEvent, instrument_id: &str) {
        let at_sample = self.timing.seconds_to_samples(event.start_time);
        let hold_samples = self.timing.seconds_to_samples(event.duration_secs);
        let instrument = self.bank.resolve(instrument_id);
        self.push(SoundCommand::Note {
            at_sample,
            hold_samples,
            pitch: event.pitch,
            gain: event.gain,
            instrument,
        });
    }

    fn silence_notes(&mut self) {
        self.push(SoundCommand::SilenceNotes);
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause audio stream: {}", e);
            }
            self.status.set(StreamStatus::Paused);
            log::info!("Audio engine closed");
        }
    }
}

/// Opens the default output device on demand
#[derive(Debug, Clone)]
pub struct CpalFactory {
    options: EngineOptions,
    bank: InstrumentBank,
}

impl CpalFactory {
    pub fn new(options: EngineOptions, bank: InstrumentBank) -> Self {
        Self { options, bank }
    }
}

impl BackendFactory for CpalFactory {
    type Backend = AudioEngine;

    fn open(&mut self) -> AudioResult<AudioEngine> {
        AudioEngine::new(&self.options, self.bank.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_status_from_u8() {
        assert_eq!(StreamStatus::from(0), StreamStatus::Running);
        assert_eq!(StreamStatus::from(1), StreamStatus::Paused);
        assert_eq!(StreamStatus::from(2), StreamStatus::Error);
        assert_eq!(StreamStatus::from(200), StreamStatus::Error);
    }

    #[test]
    fn test_atomic_status_shared() {
        let status = AtomicStreamStatus::new(StreamStatus::Paused);
        let other = status.clone();
        other.set(StreamStatus::Error);
        assert_eq!(status.get(), StreamStatus::Error);
    }
}
