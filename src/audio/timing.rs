// Audio timing - Sample counter that serves as the metronome's clock

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared sample position, advanced by the audio callback and read by the scheduler
#[derive(Clone)]
pub struct AudioTiming {
    /// Frames rendered since the stream started
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioTiming {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate as f64,
        }
    }

    /// Current sample position (called from the scheduler thread)
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance sample position (called from the audio callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Release);
    }

    /// Clock time in seconds, monotonic while the stream runs
    pub fn now_seconds(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }

    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    /// Sample index of a clock time; times before zero map to zero
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 || !seconds.is_finite() {
            return 0;
        }
        (seconds * self.sample_rate).round() as u64
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }
}
