// Speed trainer - Tempo ramp toward a target, evaluated once per completed bar
// Pure state transition over TransportState; side effects are reported, not performed

use super::timeline::{MAX_BPM, MIN_BPM, TimeSignature, seconds_per_beat};
use super::transport::TransportState;
use serde::{Deserialize, Serialize};

/// Shortest time step a practice plan may use
pub const MIN_STEP_DURATION_SECS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Up,
    Down,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

/// What counts as "enough practice" before the next step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Bars,
    Time,
}

/// Practice plan for one speed-trainer run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTrainerConfig {
    pub start_bpm: f64,
    pub target_bpm: f64,
    pub step_bpm: f64,
    pub dir: Direction,
    pub auto_stop: bool,
    pub loop_mode: LoopMode,
    /// Bars per step (bars mode)
    pub step_bars: u32,
    /// Seconds per step (time mode)
    pub step_duration_sec: f64,
}

impl SpeedTrainerConfig {
    /// Clamp every field into its valid range
    pub fn sanitized(self) -> Self {
        let bpm = |v: f64, fallback: f64| {
            if v.is_finite() { v.clamp(MIN_BPM, MAX_BPM) } else { fallback }
        };
        Self {
            start_bpm: bpm(self.start_bpm, 120.0),
            target_bpm: bpm(self.target_bpm, 160.0),
            step_bpm: if self.step_bpm.is_finite() { self.step_bpm.max(0.0) } else { 0.0 },
            dir: self.dir,
            auto_stop: self.auto_stop,
            loop_mode: self.loop_mode,
            step_bars: self.step_bars.max(1),
            step_duration_sec: if self.step_duration_sec.is_finite() {
                self.step_duration_sec.max(MIN_STEP_DURATION_SECS)
            } else {
                60.0
            },
        }
    }
}

impl Default for SpeedTrainerConfig {
    fn default() -> Self {
        Self {
            start_bpm: 120.0,
            target_bpm: 160.0,
            step_bpm: 4.0,
            dir: Direction::Up,
            auto_stop: true,
            loop_mode: LoopMode::Bars,
            step_bars: 4,
            step_duration_sec: 60.0,
        }
    }
}

/// Where a run currently is from the trainer's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    Idle,
    CountingIn,
    ActiveStepping,
    ReachedTarget,
}

impl TrainerPhase {
    pub fn of(state: &TransportState) -> Self {
        if !state.armed {
            TrainerPhase::Idle
        } else if state.count_in_remaining > 0 {
            TrainerPhase::CountingIn
        } else if state.bpm() == state.trainer.target_bpm {
            TrainerPhase::ReachedTarget
        } else {
            TrainerPhase::ActiveStepping
        }
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StepResult {
    pub changed: bool,
    pub reached: bool,
    pub disarmed: bool,
    /// Tempo applied by this step
    pub bpm: Option<f64>,
    /// Caller must stop the transport now (target reached on a bar line)
    pub stop_now: bool,
}

/// Evaluate the speed trainer for a completed bar.
///
/// Applies the new tempo to `state` directly; stopping the transport and
/// notifying observers are left to the caller through the returned result.
/// When the target is reached off the bar line the stop is deferred by
/// setting `state.stop_at_bar_line`.
pub fn consider_step(state: &mut TransportState) -> StepResult {
    if !state.armed || state.count_in_remaining > 0 {
        return StepResult::default();
    }

    let trainer = state.trainer;
    let due = match trainer.loop_mode {
        LoopMode::Bars => state.since_bars >= trainer.step_bars,
        LoopMode::Time => state.since_seconds >= trainer.step_duration_sec,
    };
    if !due {
        return StepResult::default();
    }

    state.since_bars = 0;
    state.since_seconds = 0.0;

    let direction = trainer.dir.sign();
    let next = state.bpm() + direction * trainer.step_bpm;
    let reached = if direction > 0.0 {
        next >= trainer.target_bpm
    } else {
        next <= trainer.target_bpm
    };

    state.set_tempo(if reached { trainer.target_bpm } else { next });
    let bpm = Some(state.bpm());

    if reached && trainer.auto_stop {
        state.armed = false;
        let on_bar_line = state.upcoming_beat_in_bar() == 0;
        if !on_bar_line {
            state.stop_at_bar_line = true;
        }
        return StepResult {
            changed: true,
            reached: true,
            disarmed: true,
            bpm,
            stop_now: on_bar_line,
        };
    }

    StepResult {
        changed: true,
        reached,
        disarmed: false,
        bpm,
        stop_now: false,
    }
}

/// Expected length of a drill
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrillEstimate {
    /// Number of step periods; None when the drill never ends
    pub segments: Option<u32>,
    /// Count-in plus all step periods; None when the drill never ends
    pub total_seconds: Option<f64>,
}

impl DrillEstimate {
    fn endless() -> Self {
        Self {
            segments: None,
            total_seconds: None,
        }
    }
}

/// Estimate how long an auto-stopping drill lasts.
///
/// The count-in runs at the start tempo; each segment lasts one step period
/// at the tempo in force during that segment.
pub fn estimate_drill_duration(
    config: &SpeedTrainerConfig,
    time_signature: TimeSignature,
    count_in_bars: u32,
) -> DrillEstimate {
    let config = config.sanitized();
    if !config.auto_stop {
        return DrillEstimate::endless();
    }

    let direction = config.dir.sign();
    let distance = (config.target_bpm - config.start_bpm) * direction;
    let segments = if distance <= 0.0 {
        // The first step already lands on the target
        1
    } else if config.step_bpm <= 0.0 {
        return DrillEstimate::endless();
    } else {
        (distance / config.step_bpm).ceil() as u32
    };

    let bar_seconds = |bpm: f64| {
        seconds_per_beat(bpm, time_signature.denominator) * time_signature.numerator as f64
    };

    let count_in = count_in_bars as f64 * bar_seconds(config.start_bpm);
    let stepping: f64 = match config.loop_mode {
        LoopMode::Time => segments as f64 * config.step_duration_sec,
        LoopMode::Bars => (0..segments)
            .map(|k| {
                let bpm = config.start_bpm + direction * config.step_bpm * k as f64;
                config.step_bars as f64 * bar_seconds(bpm.clamp(MIN_BPM, MAX_BPM))
            })
            .sum(),
    };

    DrillEstimate {
        segments: Some(segments),
        total_seconds: Some(count_in + stepping),
    }
}
