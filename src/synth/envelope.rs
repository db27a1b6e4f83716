// ADSR envelope - Amplitude shape for accompaniment voices
//
// Linear segments; the release always starts from the level reached when the
// note was let go, so a short note released mid-attack does not jump.

use serde::{Deserialize, Serialize};

/// ADSR Envelope parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsrParams {
    /// Attack time in seconds (0.001 to 5.0)
    pub attack: f32,
    /// Decay time in seconds (0.001 to 5.0)
    pub decay: f32,
    /// Sustain level (0.0 to 1.0)
    pub sustain: f32,
    /// Release time in seconds (0.001 to 5.0)
    pub release: f32,
}

impl AdsrParams {
    /// Create ADSR parameters with validation
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(0.001, 5.0),
            decay: decay.clamp(0.001, 5.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.clamp(0.001, 5.0),
        }
    }

    /// Short pluck used by the fallback synth
    pub fn pluck() -> Self {
        Self::new(0.005, 0.25, 0.35, 0.12)
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self::pluck()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope generator, one value per sample
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    params: AdsrParams,
    stage: Stage,
    value: f32,
    release_from: f32,
    sample_rate: f32,
    /// Samples spent in the current stage
    elapsed: f32,
}

impl AdsrEnvelope {
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        Self {
            params,
            stage: Stage::Idle,
            value: 0.0,
            release_from: 0.0,
            sample_rate,
            elapsed: 0.0,
        }
    }

    pub fn set_params(&mut self, params: AdsrParams) {
        self.params = params;
    }

    pub fn params(&self) -> AdsrParams {
        self.params
    }

    /// Start (or restart) the attack from the current level
    pub fn note_on(&mut self) {
        self.stage = Stage::Attack;
        self.elapsed = self.value * self.params.attack * self.sample_rate;
    }

    pub fn note_off(&mut self) {
        if self.stage != Stage::Idle && self.stage != Stage::Release {
            self.stage = Stage::Release;
            self.release_from = self.value;
            self.elapsed = 0.0;
        }
    }

    /// Next envelope value in [0, 1]
    pub fn process(&mut self) -> f32 {
        let sr = self.sample_rate;
        match self.stage {
            Stage::Idle => self.value = 0.0,
            Stage::Attack => {
                let len = self.params.attack * sr;
                self.value = (self.elapsed / len).min(1.0);
                self.elapsed += 1.0;
                if self.elapsed >= len {
                    self.stage = Stage::Decay;
                    self.elapsed = 0.0;
                }
            }
            Stage::Decay => {
                let len = self.params.decay * sr;
                let sustain = self.params.sustain;
                self.value = 1.0 - (self.elapsed / len).min(1.0) * (1.0 - sustain);
                self.elapsed += 1.0;
                if self.elapsed >= len {
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => self.value = self.params.sustain,
            Stage::Release => {
                let len = self.params.release * sr;
                self.value = self.release_from * (1.0 - (self.elapsed / len).min(1.0));
                self.elapsed += 1.0;
                if self.elapsed >= len {
                    self.stage = Stage::Idle;
                    self.value = 0.0;
                }
            }
        }
        self.value
    }

    /// Still producing sound (including the release tail)
    pub fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    pub fn current_value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.value = 0.0;
        self.elapsed = 0.0;
    }
}
