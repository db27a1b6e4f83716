// Configuration - RON settings file with per-field defaults
//
// Every field may be omitted. Out-of-range values are accepted on load and
// clamped when the configuration is applied.

use crate::audio::engine::EngineOptions;
use crate::audio::parameters::SharedGain;
use crate::messaging::channels::MIN_SOUND_CAPACITY;
use crate::sampler::bank::InstrumentSpec;
use crate::sequencer::accompaniment::{AccompanimentState, DEFAULT_INSTRUMENT};
use crate::sequencer::scheduler::SchedulerSettings;
use crate::sequencer::speed_trainer::SpeedTrainerConfig;
use crate::sequencer::timeline::{DEFAULT_BPM, MAX_BPM, MIN_BPM, Tempo, TimeSignature};
use crate::sequencer::transport::{ClickPattern, HorizonSettings, TransportState};
use crate::synth::SynthSettings;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "practice_metronome";
const CONFIG_FILE: &str = "config.ron";
pub const MAX_COUNT_IN_BARS: u32 = 8;
pub const MAX_RING_CAPACITY: usize = 8192;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to write configuration: {0}")]
    Serialize(#[from] ron::Error),

    #[error("No configuration directory on this platform")]
    NoConfigDir,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub lookahead_ms: f64,
    pub horizon_ms: f64,
    pub fast_horizon_ms: f64,
    pub fast_threshold_bpm: f64,
}

impl SchedulerConfig {
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            lookahead_secs: self.lookahead_ms / 1000.0,
            horizon: HorizonSettings {
                normal_secs: self.horizon_ms / 1000.0,
                fast_secs: self.fast_horizon_ms / 1000.0,
                fast_threshold_bpm: self.fast_threshold_bpm,
            },
        }
        .sanitized()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let defaults = SchedulerSettings::default();
        Self {
            lookahead_ms: defaults.lookahead_secs * 1000.0,
            horizon_ms: defaults.horizon.normal_secs * 1000.0,
            fast_horizon_ms: defaults.horizon.fast_secs * 1000.0,
            fast_threshold_bpm: defaults.horizon.fast_threshold_bpm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub beat_unit: u32,
    pub accent_first: bool,
    pub click_pattern: ClickPattern,
    pub count_in_bars: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beats_per_bar: 4,
            beat_unit: 4,
            accent_first: true,
            click_pattern: ClickPattern::All,
            count_in_bars: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccompanimentConfig {
    pub enabled: bool,
    pub volume: f32,
    pub instrument: String,
    pub instruments: Vec<InstrumentSpec>,
    pub synth: SynthSettings,
}

impl Default for AccompanimentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.8,
            instrument: DEFAULT_INSTRUMENT.to_string(),
            instruments: Vec::new(),
            synth: SynthSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub master_volume: f32,
    pub ring_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            ring_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub scheduler: SchedulerConfig,
    pub transport: TransportConfig,
    pub trainer: SpeedTrainerConfig,
    pub accompaniment: AccompanimentConfig,
    pub audio: AudioConfig,
}

impl MetronomeConfig {
    /// `<config dir>/practice_metronome/config.ron`
    pub fn default_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn from_ron(text: &str) -> ConfigResult<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> ConfigResult<String> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::new())?)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, or defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        self.scheduler.settings()
    }

    pub fn transport_state(&self) -> TransportState {
        let t = &self.transport;
        let bpm = if t.bpm.is_finite() { t.bpm.clamp(MIN_BPM, MAX_BPM) } else { DEFAULT_BPM };
        let mut state = TransportState::new(
            Tempo::new(bpm),
            TimeSignature::new(t.beats_per_bar, t.beat_unit),
        );
        state.accent_first = t.accent_first;
        state.click_pattern = t.click_pattern;
        state.count_in_bars = t.count_in_bars.min(MAX_COUNT_IN_BARS);
        state.trainer = self.trainer.sanitized();
        state
    }

    pub fn accompaniment_state(&self) -> AccompanimentState {
        let a = &self.accompaniment;
        let instrument = if a.instrument.trim().is_empty() {
            DEFAULT_INSTRUMENT
        } else {
            a.instrument.as_str()
        };
        AccompanimentState::new(a.enabled, a.volume, instrument)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            master: SharedGain::new(self.audio.master_volume),
            ring_capacity: self
                .audio
                .ring_capacity
                .clamp(MIN_SOUND_CAPACITY, MAX_RING_CAPACITY),
            synth: self.accompaniment.synth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::speed_trainer::Direction;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = MetronomeConfig::from_ron("()").unwrap();
        assert_eq!(config, MetronomeConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let text = r##"(
            transport: (bpm: 96.0, beats_per_bar: 7, beat_unit: 8, click_pattern: r#back-beats),
            trainer: (target_bpm: 80.0, dir: down),
            accompaniment: (
                instrument: "piano",
                instruments: [(id: "piano", path: "samples/piano.wav")],
            ),
        )"##;
        let config = MetronomeConfig::from_ron(text).unwrap();

        assert_eq!(config.transport.bpm, 96.0);
        assert_eq!(config.transport.click_pattern, ClickPattern::BackBeats);
        assert_eq!(config.transport.count_in_bars, 2);
        assert_eq!(config.trainer.dir, Direction::Down);
        assert_eq!(config.trainer.step_bars, 4);
        assert_eq!(config.accompaniment.instruments[0].root_note, 60);

        let state = config.transport_state();
        assert_eq!(state.beats_per_bar(), 7);
        assert_eq!(state.beat_unit(), 8);
        assert_eq!(state.seconds_per_beat(), 60.0 / 96.0 / 2.0);
    }

    #[test]
    fn test_out_of_range_values_are_clamped_when_applied() {
        let mut config = MetronomeConfig::default();
        config.transport.bpm = 1000.0;
        config.transport.count_in_bars = 99;
        config.scheduler.lookahead_ms = 50.0;
        config.scheduler.horizon_ms = 10.0;
        config.audio.ring_capacity = 1;
        config.accompaniment.volume = 3.0;
        config.accompaniment.instrument = "  ".into();

        let state = config.transport_state();
        assert_eq!(state.bpm(), MAX_BPM);
        assert_eq!(state.count_in_bars, MAX_COUNT_IN_BARS);

        let settings = config.scheduler_settings();
        assert!(settings.horizon.normal_secs > settings.lookahead_secs);

        assert_eq!(config.engine_options().ring_capacity, MIN_SOUND_CAPACITY);

        let acc = config.accompaniment_state();
        assert_eq!(acc.volume(), 1.0);
        assert_eq!(acc.instrument_id(), DEFAULT_INSTRUMENT);
    }

    #[test]
    fn test_ron_round_trip() {
        let mut config = MetronomeConfig::default();
        config.transport.click_pattern = ClickPattern::SilentMidpoint;
        config.trainer.step_bpm = 2.5;

        let text = config.to_ron().unwrap();
        assert_eq!(MetronomeConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(matches!(
            MetronomeConfig::from_ron("(transport: (bpm: \"fast\"))"),
            Err(ConfigError::Parse(_))
        ));
    }
}
