// Observers - Listeners for beats, counters and trainer steps
// A failing listener is logged and skipped; it never stops the scheduler

use super::accompaniment::AccompanimentEvent;
use super::speed_trainer::StepResult;
use super::transport::TransportSnapshot;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Observer-related errors
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Observer failed: {0}")]
    Failed(String),
}

pub type ObserverResult<T> = Result<T, ObserverError>;

/// A beat as it was handed to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeatInfo {
    /// Zero-based beat in the bar
    pub beat_in_bar: u32,
    pub accent: bool,
    /// Clock time of the beat
    pub time: f64,
    pub count_in: bool,
    /// Beats scheduled since start, counting this one
    pub beat_number: u64,
}

/// Listener interface for transport activity.
///
/// Every callback has a no-op default so implementors only pick what they need.
pub trait TransportObserver {
    fn name(&self) -> &str {
        "observer"
    }

    fn on_beat(&mut self, _beat: &BeatInfo) -> ObserverResult<()> {
        Ok(())
    }

    fn on_counters(&mut self, _counters: &TransportSnapshot) -> ObserverResult<()> {
        Ok(())
    }

    fn on_accompaniment_events(&mut self, _events: &[AccompanimentEvent]) -> ObserverResult<()> {
        Ok(())
    }

    fn on_speed_trainer_step(&mut self, _step: &StepResult) -> ObserverResult<()> {
        Ok(())
    }

    fn on_tempo_change(&mut self, _bpm: f64) -> ObserverResult<()> {
        Ok(())
    }

    fn on_disarm(&mut self) -> ObserverResult<()> {
        Ok(())
    }
}

/// Handle returned by `ObserverSet::add`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(usize);

/// Registered observers, called in registration order
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<(ObserverId, Box<dyn TransportObserver>)>,
    next_id: usize,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Box<dyn TransportObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn remove(&mut self, id: ObserverId) -> Option<Box<dyn TransportObserver>> {
        let pos = self.observers.iter().position(|(oid, _)| *oid == id)?;
        Some(self.observers.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn beat(&mut self, beat: &BeatInfo) {
        self.dispatch("on_beat", |o| o.on_beat(beat));
    }

    pub fn counters(&mut self, counters: &TransportSnapshot) {
        self.dispatch("on_counters", |o| o.on_counters(counters));
    }

    pub fn accompaniment_events(&mut self, events: &[AccompanimentEvent]) {
        self.dispatch("on_accompaniment_events", |o| o.on_accompaniment_events(events));
    }

    pub fn speed_trainer_step(&mut self, step: &StepResult) {
        self.dispatch("on_speed_trainer_step", |o| o.on_speed_trainer_step(step));
    }

    pub fn tempo_change(&mut self, bpm: f64) {
        self.dispatch("on_tempo_change", |o| o.on_tempo_change(bpm));
    }

    pub fn disarm(&mut self) {
        self.dispatch("on_disarm", |o| o.on_disarm());
    }

    fn dispatch<F>(&mut self, callback: &str, mut call: F)
    where
        F: FnMut(&mut dyn TransportObserver) -> ObserverResult<()>,
    {
        for (_, observer) in &mut self.observers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(observer.as_mut())));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("Observer '{}' failed in {}: {}", observer.name(), callback, e)
                }
                Err(_) => log::error!("Observer '{}' panicked in {}", observer.name(), callback),
            }
        }
    }
}

/// Observer that mirrors transport activity into the log
#[derive(Debug, Default)]
pub struct LogObserver;

impl TransportObserver for LogObserver {
    fn name(&self) -> &str {
        "log"
    }

    fn on_beat(&mut self, beat: &BeatInfo) -> ObserverResult<()> {
        log::trace!(
            "beat {} at {:.3}s{}{}",
            beat.beat_in_bar + 1,
            beat.time,
            if beat.accent { " (accent)" } else { "" },
            if beat.count_in { " (count-in)" } else { "" }
        );
        Ok(())
    }

    fn on_speed_trainer_step(&mut self, step: &StepResult) -> ObserverResult<()> {
        if let Some(bpm) = step.bpm {
            log::info!("Speed trainer: {:.1} BPM{}", bpm, if step.reached { " (target)" } else { "" });
        }
        Ok(())
    }

    fn on_tempo_change(&mut self, bpm: f64) -> ObserverResult<()> {
        log::debug!("Tempo changed to {:.1} BPM", bpm);
        Ok(())
    }

    fn on_disarm(&mut self) -> ObserverResult<()> {
        log::info!("Speed trainer disarmed");
        Ok(())
    }
}
