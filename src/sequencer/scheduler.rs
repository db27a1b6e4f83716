// Scheduler - Look-ahead beat scheduler driven by the audio clock
//
// A driver calls `tick` every lookahead interval. Each tick queues every beat
// whose time falls before `now + horizon`, so the renderer always holds the
// next few clicks and notes with exact clock times, whatever the timer jitter.

use super::accompaniment::AccompanimentState;
use super::inspector::SyncSnapshot;
use super::observer::{BeatInfo, ObserverId, ObserverSet, TransportObserver};
use super::speed_trainer::{self, DrillEstimate, SpeedTrainerConfig, StepResult};
use super::transport::{ClickPattern, HorizonSettings, TransportState};
use super::timeline::TimeSignature;
use crate::audio::backend::{AudioRenderer, BackendFactory, ClickMode, ClockSource};
use crate::midi::{self, TrackError, TrackResult};
use std::time::Duration;

/// Timer period of the driver loop
pub const DEFAULT_LOOKAHEAD_SECS: f64 = 0.025;
pub const MIN_LOOKAHEAD_SECS: f64 = 0.005;
pub const MAX_LOOKAHEAD_SECS: f64 = 0.1;
/// The horizon always covers one lookahead period plus this margin
pub const HORIZON_MARGIN_SECS: f64 = 0.02;
pub const MAX_HORIZON_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub lookahead_secs: f64,
    pub horizon: HorizonSettings,
}

impl SchedulerSettings {
    /// Clamp into a usable range; the horizon never drops below
    /// `lookahead + HORIZON_MARGIN_SECS`
    pub fn sanitized(self) -> Self {
        let lookahead = finite_or(self.lookahead_secs, DEFAULT_LOOKAHEAD_SECS)
            .clamp(MIN_LOOKAHEAD_SECS, MAX_LOOKAHEAD_SECS);
        let floor = lookahead + HORIZON_MARGIN_SECS;
        let defaults = HorizonSettings::default();

        Self {
            lookahead_secs: lookahead,
            horizon: HorizonSettings {
                normal_secs: finite_or(self.horizon.normal_secs, defaults.normal_secs)
                    .clamp(floor, MAX_HORIZON_SECS),
                fast_secs: finite_or(self.horizon.fast_secs, defaults.fast_secs)
                    .clamp(floor, MAX_HORIZON_SECS),
                fast_threshold_bpm: finite_or(
                    self.horizon.fast_threshold_bpm,
                    defaults.fast_threshold_bpm,
                ),
            },
        }
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_secs_f64(self.lookahead_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lookahead_secs: DEFAULT_LOOKAHEAD_SECS,
            horizon: HorizonSettings::default(),
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// The metronome: transport, accompaniment and speed trainer around one
/// lazily opened audio backend.
///
/// Nothing here blocks or fails loudly. Without a backend every tick is a
/// no-op, and observer failures are logged and skipped.
pub struct Metronome<F: BackendFactory> {
    factory: F,
    backend: Option<F::Backend>,
    settings: SchedulerSettings,
    transport: TransportState,
    accompaniment: AccompanimentState,
    observers: ObserverSet,
}

impl<F: BackendFactory> Metronome<F> {
    pub fn new(
        factory: F,
        settings: SchedulerSettings,
        mut transport: TransportState,
        accompaniment: AccompanimentState,
    ) -> Self {
        let settings = settings.sanitized();
        transport.set_horizon_settings(settings.horizon);
        transport.trainer = transport.trainer.sanitized();
        transport.is_running = false;
        Self {
            factory,
            backend: None,
            settings,
            transport,
            accompaniment,
            observers: ObserverSet::new(),
        }
    }

    /// Default transport (120 bpm, 4/4) and accompaniment settings
    pub fn with_factory(factory: F) -> Self {
        Self::new(
            factory,
            SchedulerSettings::default(),
            TransportState::default(),
            AccompanimentState::default(),
        )
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// How long the driver should wait between ticks
    pub fn lookahead(&self) -> Duration {
        self.settings.lookahead()
    }

    pub fn transport(&self) -> &TransportState {
        &self.transport
    }

    pub fn accompaniment(&self) -> &AccompanimentState {
        &self.accompaniment
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Current clock time, if a backend is open
    pub fn now(&self) -> Option<f64> {
        self.backend.as_ref().map(|b| b.now())
    }

    pub fn add_observer(&mut self, observer: Box<dyn TransportObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Box<dyn TransportObserver>> {
        self.observers.remove(id)
    }

    fn ensure_backend(&mut self) -> bool {
        if self.backend.is_none() {
            match self.factory.open() {
                Ok(backend) => self.backend = Some(backend),
                Err(e) => {
                    log::warn!("Audio unavailable, start ignored: {}", e);
                    return false;
                }
            }
        }
        true
    }

    // ============ Transport ============

    /// Start the clicks. Opens the backend on first use; a missing device
    /// makes this a logged no-op.
    pub fn start(&mut self) {
        if !self.ensure_backend() {
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if let Err(e) = backend.resume() {
            log::warn!("Audio clock did not resume, start ignored: {}", e);
            return;
        }
        if self.transport.is_running {
            return;
        }
        let now = backend.now();

        self.transport.is_running = true;
        if self.transport.armed {
            let start_bpm = self.transport.trainer.start_bpm;
            self.transport.set_tempo(start_bpm);
            self.observers.tempo_change(self.transport.bpm());
        }

        let one_beat = self.transport.seconds_per_beat();
        self.transport.reset_counters(now, one_beat);
        self.accompaniment.reset_anchor(&self.transport);

        log::info!(
            "Started at {:.1} BPM, {}{}",
            self.transport.bpm(),
            self.transport.time_signature(),
            if self.transport.armed { " (speed trainer armed)" } else { "" }
        );

        self.observers.beat(&BeatInfo {
            beat_in_bar: 0,
            accent: true,
            time: self.transport.next_note_time,
            count_in: self.transport.in_count_in(),
            beat_number: 0,
        });
        self.tick();
    }

    /// Stop and rewind. The loaded track stays, its position is reset.
    pub fn stop(&mut self) {
        let was_running = self.transport.is_running;
        self.transport.is_running = false;

        let now = self.now().unwrap_or(0.0);
        let one_beat = self.transport.seconds_per_beat();
        self.transport.reset_counters(now, one_beat);

        if let Some(backend) = self.backend.as_mut() {
            backend.silence_notes();
        }
        self.accompaniment.stop(false);

        if was_running {
            log::info!("Stopped");
        }
    }

    /// Stop, then release the audio device. The next start reopens it.
    pub fn panic(&mut self) {
        self.stop();
        if let Some(mut backend) = self.backend.take() {
            backend.close();
        }
        log::warn!("Panic: audio closed");
    }

    /// Queue every beat due before `now + horizon`
    pub fn tick(&mut self) {
        if !self.transport.is_running {
            return;
        }
        let Some(now) = self.now() else {
            return;
        };
        let horizon_end = now + self.transport.schedule_horizon();
        while self.transport.is_running && self.transport.next_note_time < horizon_end {
            self.schedule_beat();
        }
    }

    fn schedule_beat(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let transport = &self.transport;
        let spb = transport.seconds_per_beat();
        let time = transport.next_note_time;
        let beat = transport.upcoming_beat_in_bar();
        let accent = transport.accent_first && beat == 0;
        let count_in = transport.in_count_in();

        if count_in {
            backend.schedule_click(time, accent, ClickMode::CountIn);
        } else if transport.click_pattern == ClickPattern::SilentMidpoint {
            backend.schedule_click(time + spb / 2.0, false, ClickMode::Normal);
        } else if transport.click_pattern.clicks_on(beat) {
            backend.schedule_click(time, accent, ClickMode::Normal);
        }

        let events = self.accompaniment.schedule_due(time, spb);
        let audible = self.accompaniment.enabled && self.accompaniment.is_loaded();
        if audible {
            let instrument = self.accompaniment.instrument_id();
            for event in &events {
                backend.schedule_note(event, instrument);
            }
        }

        self.observers.beat(&BeatInfo {
            beat_in_bar: beat,
            accent,
            time,
            count_in,
            beat_number: self.transport.beats + 1,
        });
        if audible && !events.is_empty() {
            self.observers.accompaniment_events(&events);
        }

        if self.transport.advance_beat() {
            self.complete_bar();
        }
        self.observers.counters(&self.transport.snapshot());
    }

    fn complete_bar(&mut self) {
        self.transport.complete_bar();

        if self.transport.stop_at_bar_line {
            self.transport.stop_at_bar_line = false;
            log::info!("Target tempo reached, stopping at the bar line");
            self.stop();
            return;
        }

        let step = speed_trainer::consider_step(&mut self.transport);
        self.apply_step(step);
    }

    /// Evaluate the speed trainer now instead of waiting for the bar line.
    /// Reaching the target off the bar line disarms at once and stops at the
    /// next bar line.
    pub fn consider_step(&mut self) -> StepResult {
        let step = speed_trainer::consider_step(&mut self.transport);
        self.apply_step(step);
        step
    }

    fn apply_step(&mut self, step: StepResult) {
        if !step.changed {
            return;
        }
        self.observers.speed_trainer_step(&step);
        if let Some(bpm) = step.bpm {
            self.observers.tempo_change(bpm);
            if self.transport.is_running {
                self.accompaniment.reanchor(&self.transport);
            }
        }
        if step.disarmed {
            self.observers.disarm();
        }
        if step.stop_now {
            log::info!("Target tempo reached");
            self.stop();
        }
    }

    // ============ Commands ============

    pub fn set_tempo(&mut self, bpm: f64) {
        self.transport.set_tempo(bpm);
        if self.transport.is_running {
            self.accompaniment.reanchor(&self.transport);
        }
        self.observers.tempo_change(self.transport.bpm());
    }

    /// Change meter. While running the next beat is rescheduled as a downbeat.
    pub fn set_meter(&mut self, time_signature: TimeSignature) {
        self.transport.set_time_signature(time_signature);
        if self.transport.is_running {
            self.transport.cur_beat_in_bar = self.transport.beats_per_bar() - 1;
            self.accompaniment.reanchor(&self.transport);
        }
        log::debug!("Meter set to {}", time_signature);
    }

    pub fn set_click_pattern(&mut self, pattern: ClickPattern) {
        self.transport.click_pattern = pattern;
    }

    pub fn set_accent_first(&mut self, accent: bool) {
        self.transport.accent_first = accent;
    }

    pub fn set_count_in_bars(&mut self, bars: u32) {
        self.transport.count_in_bars = bars;
    }

    pub fn set_trainer(&mut self, config: SpeedTrainerConfig) {
        self.transport.trainer = config.sanitized();
    }

    /// Arm the speed trainer; it takes effect with the next start
    pub fn arm(&mut self) {
        self.transport.armed = true;
        let estimate = self.drill_estimate();
        match estimate.total_seconds {
            Some(total) => log::info!(
                "Speed trainer armed: {} steps, about {:.0}s",
                estimate.segments.unwrap_or(0),
                total
            ),
            None => log::info!("Speed trainer armed: runs until stopped"),
        }
    }

    /// Install a practice plan and arm it
    pub fn arm_with(&mut self, config: SpeedTrainerConfig) {
        self.set_trainer(config);
        self.arm();
    }

    /// Expected length of the armed drill, count-in included
    pub fn drill_estimate(&self) -> DrillEstimate {
        speed_trainer::estimate_drill_duration(
            &self.transport.trainer,
            self.transport.time_signature(),
            self.transport.count_in_bars,
        )
    }

    /// Disarm now. A running count-in finishes normally.
    pub fn disarm(&mut self) {
        if !self.transport.armed && !self.transport.stop_at_bar_line {
            return;
        }
        self.transport.armed = false;
        self.transport.stop_at_bar_line = false;
        self.observers.disarm();
    }

    /// Parse and load a backing track. On error nothing changes.
    pub fn load_accompaniment(&mut self, bytes: &[u8]) -> TrackResult<()> {
        let parsed = midi::parse(bytes)?;
        if !parsed.is_playable() {
            return Err(TrackError::NoPlayableNotes);
        }

        if let Some(backend) = self.backend.as_mut() {
            backend.silence_notes();
        }
        self.accompaniment.load(&parsed.notes, parsed.info());
        if self.transport.is_running {
            self.accompaniment.align_to_next_bar(&self.transport);
        }

        log::info!(
            "Loaded accompaniment: {} notes, {:.1} beats ({}), loop {} beats",
            parsed.notes.len(),
            parsed.total_beats,
            parsed.time_signature,
            self.accompaniment.loop_beats()
        );
        Ok(())
    }

    pub fn clear_accompaniment(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.silence_notes();
        }
        self.accompaniment.clear();
    }

    pub fn set_accompaniment_enabled(&mut self, enabled: bool) {
        if !enabled && self.accompaniment.enabled {
            if let Some(backend) = self.backend.as_mut() {
                backend.silence_notes();
            }
        }
        self.accompaniment.enabled = enabled;
    }

    pub fn set_accompaniment_volume(&mut self, volume: f32) {
        self.accompaniment.set_volume(volume);
    }

    /// Switch the accompaniment instrument. While running, sounding notes are
    /// silenced and the track continues from the next beat.
    pub fn set_instrument(&mut self, instrument_id: &str) {
        if self.accompaniment.instrument_id() == instrument_id {
            return;
        }
        self.accompaniment.set_instrument_id(instrument_id);
        if self.transport.is_running {
            if let Some(backend) = self.backend.as_mut() {
                backend.silence_notes();
            }
            self.accompaniment.stop(true);
            self.accompaniment.reanchor(&self.transport);
        }
        log::debug!("Instrument set to {}", instrument_id);
    }

    /// Move the accompaniment anchor to the next beat without losing its place
    pub fn resync(&mut self) {
        if self.transport.is_running {
            self.accompaniment.reanchor(&self.transport);
            log::debug!("Accompaniment re-anchored at {:.3}s", self.accompaniment.anchor_time);
        }
    }

    /// Sync inspector snapshot of the next `upcoming` beats
    pub fn snapshot(&self, upcoming: usize) -> SyncSnapshot {
        SyncSnapshot::capture(&self.transport, &self.accompaniment, self.now(), upcoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline::{OfflineBackend, OfflineFactory, RenderCall};
    use crate::midi::smf::builder::{file, track};
    use crate::sequencer::observer::ObserverResult;
    use crate::sequencer::speed_trainer::LoopMode;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn metronome() -> (Metronome<OfflineFactory>, OfflineBackend) {
        let backend = OfflineBackend::new();
        let metronome = Metronome::with_factory(OfflineFactory::new(backend.clone()));
        (metronome, backend)
    }

    /// Advance the clock in lookahead steps, ticking each time
    fn run_for(m: &mut Metronome<OfflineFactory>, backend: &OfflineBackend, seconds: f64) {
        let steps = (seconds / DEFAULT_LOOKAHEAD_SECS).round() as usize;
        for _ in 0..steps {
            backend.advance(DEFAULT_LOOKAHEAD_SECS);
            m.tick();
        }
    }

    /// One note per beat for `beats` beats
    fn track_bytes(beats: u32) -> Vec<u8> {
        let mut events: Vec<(u32, Vec<u8>)> = Vec::new();
        for i in 0..beats {
            events.push((0, vec![0x90, 60 + i as u8, 100]));
            events.push((240, vec![0x80, 60 + i as u8, 0]));
            events.push((240, vec![0xFF, 0x01, 0x00]));
        }
        let refs: Vec<(u32, &[u8])> = events.iter().map(|(d, b)| (*d, b.as_slice())).collect();
        file(480, &[track(&refs)])
    }

    #[derive(Default)]
    struct Log {
        beats: Vec<BeatInfo>,
        tempos: Vec<f64>,
        disarms: usize,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl TransportObserver for Recorder {
        fn on_beat(&mut self, beat: &BeatInfo) -> ObserverResult<()> {
            self.0.borrow_mut().beats.push(*beat);
            Ok(())
        }

        fn on_tempo_change(&mut self, bpm: f64) -> ObserverResult<()> {
            self.0.borrow_mut().tempos.push(bpm);
            Ok(())
        }

        fn on_disarm(&mut self) -> ObserverResult<()> {
            self.0.borrow_mut().disarms += 1;
            Ok(())
        }
    }

    #[test]
    fn test_settings_keep_horizon_above_lookahead() {
        let settings = SchedulerSettings {
            lookahead_secs: 0.05,
            horizon: HorizonSettings {
                normal_secs: 0.01,
                fast_secs: f64::NAN,
                fast_threshold_bpm: 200.0,
            },
        }
        .sanitized();

        assert_eq!(settings.horizon.normal_secs, 0.05 + HORIZON_MARGIN_SECS);
        assert_eq!(settings.horizon.fast_secs, HorizonSettings::default().fast_secs);
        assert_eq!(settings.lookahead_secs, 0.05);
    }

    #[test]
    fn test_start_without_device_is_a_no_op() {
        let (mut m, backend) = metronome();
        backend.set_available(false);

        m.start();
        m.tick();

        assert!(!m.is_running());
        assert!(!m.has_backend());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_first_tick_schedules_within_horizon() {
        let (mut m, backend) = metronome();
        backend.set_now(1.0);

        m.start();

        // Next beat is one beat after start, beyond the 120 ms horizon
        assert!(backend.clicks().is_empty());
        assert_eq!(m.transport().next_note_time, 1.5);

        backend.set_now(1.4);
        m.tick();
        assert_eq!(backend.clicks(), vec![(1.5, true, ClickMode::Normal)]);
        assert_eq!(m.transport().next_note_time, 2.0);
    }

    #[test]
    fn test_beats_are_evenly_spaced_and_accented_on_downbeat() {
        let (mut m, backend) = metronome();
        m.start();
        run_for(&mut m, &backend, 4.2);

        let clicks = backend.clicks();
        assert_eq!(clicks.len(), 8);
        for (i, (time, accented, mode)) in clicks.iter().enumerate() {
            assert!((time - 0.5 * (i + 1) as f64).abs() < 1e-9);
            assert_eq!(*accented, i % 4 == 0);
            assert_eq!(*mode, ClickMode::Normal);
        }
        // No click is scheduled later than the horizon allows
        assert!(clicks.iter().all(|(t, _, _)| *t < 4.2 + 0.12 + 1e-9));
    }

    #[test]
    fn test_late_tick_catches_up_without_skipping() {
        let (mut m, backend) = metronome();
        m.start();

        // The timer stalls for two seconds
        backend.advance(2.0);
        m.tick();

        let times: Vec<f64> = backend.clicks().iter().map(|c| c.0).collect();
        assert_eq!(times, vec![0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_stop_then_start_restarts_on_accented_downbeat() {
        let (mut m, backend) = metronome();
        let log = Rc::new(RefCell::new(Log::default()));
        m.add_observer(Box::new(Recorder(log.clone())));

        m.start();
        run_for(&mut m, &backend, 1.3);
        m.stop();

        assert!(!m.is_running());
        assert_eq!(m.transport().cur_beat_in_bar, 3);
        assert_eq!(m.transport().beats, 0);

        log.borrow_mut().beats.clear();
        backend.clear();
        m.start();
        backend.advance(0.5);
        m.tick();

        let beats = log.borrow().beats.clone();
        // Start notice, then the first scheduled beat
        assert_eq!(beats[0].beat_number, 0);
        assert!(beats[0].accent);
        assert_eq!(beats[1].beat_in_bar, 0);
        assert!(beats[1].accent);
        assert!(backend.clicks()[0].1);
    }

    #[test]
    fn test_stop_silences_renderer() {
        let (mut m, backend) = metronome();
        m.start();
        m.stop();
        assert!(backend.calls().iter().any(|c| c.call == RenderCall::SilenceNotes));
    }

    #[test]
    fn test_stop_while_armed_keeps_pending_count_in() {
        let (mut m, backend) = metronome();
        m.set_count_in_bars(2);
        m.set_trainer(SpeedTrainerConfig {
            start_bpm: 120.0,
            auto_stop: false,
            ..SpeedTrainerConfig::default()
        });
        m.arm();
        m.start();
        run_for(&mut m, &backend, 1.3);
        assert_eq!(m.transport().count_in_remaining, 2);

        // Past the first count-in bar
        run_for(&mut m, &backend, 1.0);
        assert_eq!(m.transport().count_in_remaining, 1);

        m.stop();
        assert!(m.transport().armed);
        assert_eq!(m.transport().count_in_remaining, 2);
        assert!(m.transport().in_count_in());

        m.disarm();
        m.stop();
        assert_eq!(m.transport().count_in_remaining, 0);
    }

    #[test]
    fn test_panic_closes_and_next_start_reopens() {
        let (mut m, backend) = metronome();
        m.start();
        m.panic();

        assert!(!m.has_backend());
        assert!(backend.is_closed());
        m.tick();

        m.start();
        assert!(m.has_backend());
        assert!(m.is_running());
        assert_eq!(backend.open_count(), 2);
    }

    #[test]
    fn test_click_patterns() {
        let patterns = [
            (ClickPattern::BackBeats, vec![1.0, 2.0, 3.0, 4.0]),
            (ClickPattern::Downbeat, vec![0.5, 2.5]),
            (ClickPattern::SilentMidpoint, vec![0.75, 1.25, 1.75, 2.25, 2.75, 3.25, 3.75, 4.25]),
        ];
        for (pattern, expected) in patterns {
            let (mut m, backend) = metronome();
            m.set_click_pattern(pattern);
            m.start();
            run_for(&mut m, &backend, 4.2);

            let times: Vec<f64> = backend.clicks().iter().map(|c| c.0).collect();
            assert_eq!(times, expected, "{}", pattern);
        }
    }

    #[test]
    fn test_count_in_then_accompaniment() {
        let (mut m, backend) = metronome();
        m.load_accompaniment(&track_bytes(4)).unwrap();
        m.set_trainer(SpeedTrainerConfig {
            start_bpm: 120.0,
            auto_stop: false,
            ..SpeedTrainerConfig::default()
        });
        m.arm();
        m.start();
        run_for(&mut m, &backend, 6.2);

        let clicks = backend.clicks();
        assert!(clicks[..8].iter().all(|c| c.2 == ClickMode::CountIn));
        assert!(clicks[8..].iter().all(|c| c.2 == ClickMode::Normal));

        // First note lands on the ninth beat
        let notes = backend.notes();
        assert!(!notes.is_empty());
        assert!((notes[0].start_time - 4.5).abs() < 1e-9);
        assert_eq!(notes[0].pitch, 60);
        assert!((notes[0].duration_secs - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_accompaniment_keeps_position() {
        let (mut m, backend) = metronome();
        m.load_accompaniment(&track_bytes(4)).unwrap();
        m.set_accompaniment_enabled(false);
        m.start();
        run_for(&mut m, &backend, 1.2);
        assert!(backend.notes().is_empty());

        m.set_accompaniment_enabled(true);
        run_for(&mut m, &backend, 0.5);

        // Third beat of the track plays at its own time
        let notes = backend.notes();
        assert_eq!(notes[0].pitch, 62);
        assert!((notes[0].start_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_speed_trainer_steps_and_auto_stops() {
        let (mut m, backend) = metronome();
        let log = Rc::new(RefCell::new(Log::default()));
        m.add_observer(Box::new(Recorder(log.clone())));
        m.set_count_in_bars(0);
        m.set_trainer(SpeedTrainerConfig {
            start_bpm: 120.0,
            target_bpm: 130.0,
            step_bpm: 5.0,
            step_bars: 1,
            loop_mode: LoopMode::Bars,
            ..SpeedTrainerConfig::default()
        });
        m.arm();
        m.start();
        run_for(&mut m, &backend, 10.0);

        let log = log.borrow();
        assert_eq!(log.tempos, vec![120.0, 125.0, 130.0]);
        assert_eq!(log.disarms, 1);
        assert!(!m.is_running());
        assert!(!m.transport().armed);
        // Two bars of four, the stop lands on the bar line
        assert_eq!(backend.clicks().len(), 8);
    }

    #[test]
    fn test_target_reached_mid_bar_stops_at_bar_line() {
        let (mut m, backend) = metronome();
        m.set_count_in_bars(0);
        m.set_trainer(SpeedTrainerConfig {
            start_bpm: 135.0,
            target_bpm: 140.0,
            step_bpm: 5.0,
            step_bars: 1,
            ..SpeedTrainerConfig::default()
        });
        m.arm();
        m.start();
        backend.advance(0.5);
        m.tick();
        assert_eq!(m.transport().cur_beat_in_bar, 0);

        m.transport.since_bars = 1;
        let step = m.consider_step();
        assert!(step.reached && step.disarmed && !step.stop_now);
        assert!(m.is_running());
        assert!(!m.transport().armed);

        run_for(&mut m, &backend, 3.0);
        assert!(!m.is_running());
        // Beats 2-4 of the bar still played
        assert_eq!(backend.clicks().len(), 4);
    }

    #[test]
    fn test_tempo_change_reanchors_running_track() {
        let (mut m, backend) = metronome();
        m.load_accompaniment(&track_bytes(8)).unwrap();
        m.start();
        run_for(&mut m, &backend, 1.0);

        let before = m.accompaniment().next_timeline_index();
        m.set_tempo(60.0);
        let acc = m.accompaniment();
        assert_eq!(acc.next_timeline_index(), before);
        assert_eq!(acc.anchor_time, m.transport().next_note_time);
        // The next track beat is due on the next transport beat
        let next = acc.next_timeline_index() as f64;
        assert_eq!(acc.compute_note_time(next, 1.0), m.transport().next_note_time);
    }

    #[test]
    fn test_meter_change_mid_bar_starts_a_new_bar() {
        let (mut m, backend) = metronome();
        m.load_accompaniment(&track_bytes(8)).unwrap();
        m.start();
        run_for(&mut m, &backend, 1.3);
        assert_eq!(m.transport().cur_beat_in_bar, 1);

        let before = m.accompaniment().next_timeline_index();
        let next_beat = m.transport().next_note_time;
        m.set_meter(TimeSignature::three_four());

        assert_eq!(m.transport().upcoming_beat_in_bar(), 0);
        assert_eq!(m.transport().next_note_time, next_beat);
        let acc = m.accompaniment();
        assert_eq!(acc.next_timeline_index(), before);
        assert_eq!(acc.anchor_time, next_beat);

        backend.clear();
        run_for(&mut m, &backend, 2.0);
        let clicks = backend.clicks();
        let accents: Vec<bool> = clicks.iter().map(|c| c.1).collect();
        assert_eq!(accents, vec![true, false, false, true]);
        assert!((clicks[0].0 - next_beat).abs() < 1e-9);

        // The track carries on from where it was
        let notes = backend.notes();
        assert_eq!(notes[0].pitch, 60 + before as u8);
        assert!((notes[0].start_time - next_beat).abs() < 1e-9);
    }

    #[test]
    fn test_load_rejects_bad_tracks_without_side_effects() {
        let (mut m, _backend) = metronome();
        m.load_accompaniment(&track_bytes(2)).unwrap();

        assert!(matches!(
            m.load_accompaniment(b"not midi"),
            Err(TrackError::InvalidHeader(_))
        ));
        let empty = file(480, &[track(&[])]);
        assert!(matches!(
            m.load_accompaniment(&empty),
            Err(TrackError::NoPlayableNotes)
        ));
        let endless = file(1, &[track(&[(0x0FFF_FFFF, &[0x90, 60, 100]), (1, &[0x80, 60, 0])])]);
        assert!(matches!(
            m.load_accompaniment(&endless),
            Err(TrackError::TrackTooLong { .. })
        ));
        assert_eq!(m.accompaniment().track().map(|t| t.note_count), Some(2));
        assert_eq!(m.accompaniment().loop_beats(), 4);
    }

    #[test]
    fn test_instrument_switch_keeps_progress() {
        let (mut m, backend) = metronome();
        m.load_accompaniment(&track_bytes(4)).unwrap();
        m.start();
        run_for(&mut m, &backend, 1.0);

        let scheduled = m.accompaniment().scheduled_beats;
        backend.clear();
        m.set_instrument("piano");

        assert_eq!(m.accompaniment().scheduled_beats, scheduled);
        assert_eq!(backend.calls()[0].call, RenderCall::SilenceNotes);

        run_for(&mut m, &backend, 0.5);
        let notes: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|c| match c.call {
                RenderCall::Note { instrument_id, .. } => Some(instrument_id),
                _ => None,
            })
            .collect();
        assert!(!notes.is_empty());
        assert!(notes.iter().all(|id| id == "piano"));
    }

    #[test]
    fn test_drill_estimate_follows_trainer_and_meter() {
        let (mut m, _backend) = metronome();
        m.set_count_in_bars(1);
        m.arm_with(SpeedTrainerConfig {
            start_bpm: 120.0,
            target_bpm: 140.0,
            step_bpm: 5.0,
            step_bars: 1,
            auto_stop: true,
            ..SpeedTrainerConfig::default()
        });
        assert!(m.transport().armed);

        let estimate = m.drill_estimate();
        assert_eq!(estimate.segments, Some(4));
        // One count-in bar, then a bar each at 120, 125, 130 and 135
        let total = estimate.total_seconds.unwrap();
        assert!((total - 9.544).abs() < 0.01);
    }
}
