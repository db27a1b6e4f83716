// Atomic parameters - Lock-free values shared with the audio thread

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe f32 stored as raw bits in an AtomicU32
#[derive(Clone, Debug)]
pub struct AtomicF32 {
    inner: Arc<AtomicU32>,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    pub fn set(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Gain in [0, 1] shared between the control side and the callback
#[derive(Clone, Debug, Default)]
pub struct SharedGain(AtomicF32);

impl SharedGain {
    pub fn new(gain: f32) -> Self {
        let shared = Self(AtomicF32::default());
        shared.set(gain);
        shared
    }

    /// Store a gain, clamped; NaN mutes
    pub fn set(&self, gain: f32) {
        let gain = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) };
        self.0.set(gain);
    }

    pub fn get(&self) -> f32 {
        self.0.get()
    }
}
