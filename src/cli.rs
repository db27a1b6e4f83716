use clap::Parser;
use practice_metronome::config::MetronomeConfig;
use practice_metronome::{ClickPattern, TimeSignature};
use std::path::PathBuf;

fn parse_meter(text: &str) -> Result<TimeSignature, String> {
    TimeSignature::parse(text).ok_or_else(|| format!("expected N/D, got '{}'", text))
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config RON (defaults to the platform config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tempo in beats per minute (overrides config)
    #[arg(long)]
    pub bpm: Option<f64>,

    /// Meter such as 4/4 or 7/8 (overrides config)
    #[arg(long, value_parser = parse_meter)]
    pub meter: Option<TimeSignature>,

    /// Click pattern: all, 24, 1 or off (overrides config)
    #[arg(long)]
    pub pattern: Option<ClickPattern>,

    /// Count-in bars before the accompaniment enters (overrides config)
    #[arg(long)]
    pub count_in: Option<u32>,

    /// Standard MIDI file to play along with
    #[arg(long)]
    pub midi: Option<PathBuf>,

    /// Accompaniment instrument id (overrides config)
    #[arg(long)]
    pub instrument: Option<String>,

    /// Arm the speed trainer before starting
    #[arg(long, default_value_t = false)]
    pub arm: bool,

    /// Render offline to this wav file instead of playing
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Length of an offline run in seconds
    #[arg(long, default_value_t = 16.0)]
    pub seconds: f64,

    /// Run offline and print a sync snapshot as JSON
    #[arg(long, default_value_t = false)]
    pub inspect: bool,

    /// Write the effective configuration back to the config file
    #[arg(long, default_value_t = false)]
    pub save_config: bool,
}

impl Args {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply(&self, config: &mut MetronomeConfig) {
        if let Some(bpm) = self.bpm {
            config.transport.bpm = bpm;
        }
        if let Some(meter) = self.meter {
            config.transport.beats_per_bar = meter.numerator;
            config.transport.beat_unit = meter.denominator;
        }
        if let Some(pattern) = self.pattern {
            config.transport.click_pattern = pattern;
        }
        if let Some(bars) = self.count_in {
            config.transport.count_in_bars = bars;
        }
        if let Some(instrument) = &self.instrument {
            config.accompaniment.instrument = instrument.clone();
        }
    }

    pub fn is_offline(&self) -> bool {
        self.export.is_some() || self.inspect
    }
}
