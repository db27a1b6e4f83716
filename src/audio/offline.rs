// Offline backend - Manually advanced clock that records every renderer call
// Drives the scheduler in tests and feeds the WAV exporter

use crate::audio::backend::{
    AudioError, AudioRenderer, AudioResult, BackendFactory, ClickMode, ClockSource,
};
use crate::sequencer::accompaniment::AccompanimentEvent;
use std::cell::RefCell;
use std::rc::Rc;

/// One renderer call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Click {
        time: f64,
        accented: bool,
        mode: ClickMode,
    },
    Note {
        event: AccompanimentEvent,
        instrument_id: String,
    },
    SilenceNotes,
    Close,
}

/// A call and the clock time at which it was made
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub issued_at: f64,
    pub call: RenderCall,
}

#[derive(Debug)]
struct OfflineState {
    now: f64,
    available: bool,
    closed: bool,
    opened: u32,
    resumed: u32,
    calls: Vec<RecordedCall>,
}

/// Shared handle: clones see the same clock and recording
#[derive(Debug, Clone)]
pub struct OfflineBackend {
    state: Rc<RefCell<OfflineState>>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(OfflineState {
                now: 0.0,
                available: true,
                closed: false,
                opened: 0,
                resumed: 0,
                calls: Vec::new(),
            })),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, seconds: f64) {
        self.state.borrow_mut().now += seconds.max(0.0);
    }

    pub fn set_now(&self, now: f64) {
        self.state.borrow_mut().now = now;
    }

    /// Make the next `open` fail (or succeed again)
    pub fn set_available(&self, available: bool) {
        self.state.borrow_mut().available = available;
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// How many times a factory opened this backend
    pub fn open_count(&self) -> u32 {
        self.state.borrow().opened
    }

    pub fn resume_count(&self) -> u32 {
        self.state.borrow().resumed
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<RecordedCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Recorded clicks as (time, accented, mode)
    pub fn clicks(&self) -> Vec<(f64, bool, ClickMode)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c.call {
                RenderCall::Click {
                    time,
                    accented,
                    mode,
                } => Some((time, accented, mode)),
                _ => None,
            })
            .collect()
    }

    /// Recorded accompaniment notes
    pub fn notes(&self) -> Vec<AccompanimentEvent> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match &c.call {
                RenderCall::Note { event, .. } => Some(*event),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RenderCall) {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return;
        }
        let issued_at = state.now;
        state.calls.push(RecordedCall { issued_at, call });
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for OfflineBackend {
    fn now(&self) -> f64 {
        self.state.borrow().now
    }

    fn resume(&mut self) -> AudioResult<()> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(AudioError::Unavailable);
        }
        state.resumed += 1;
        Ok(())
    }
}

impl AudioRenderer for OfflineBackend {
    fn schedule_click(&mut self, time: f64, accented: bool, mode: ClickMode) {
        self.record(RenderCall::Click {
            time,
            accented,
            mode,
        });
    }

    fn schedule_note(&mut self, event: &AccompanimentEvent, instrument_id: &str) {
        self.record(RenderCall::Note {
            event: *event,
            instrument_id: instrument_id.to_string(),
        });
    }

    fn silence_notes(&mut self) {
        self.record(RenderCall::SilenceNotes);
    }

    fn close(&mut self) {
        self.record(RenderCall::Close);
        self.state.borrow_mut().closed = true;
    }
}

/// Hands out the shared offline backend, honouring its availability flag
#[derive(Debug, Clone)]
pub struct OfflineFactory {
    backend: OfflineBackend,
}

impl OfflineFactory {
    pub fn new(backend: OfflineBackend) -> Self {
        Self { backend }
    }
}

impl BackendFactory for OfflineFactory {
    type Backend = OfflineBackend;

    fn open(&mut self) -> AudioResult<OfflineBackend> {
        let mut state = self.backend.state.borrow_mut();
        if !state.available {
            return Err(AudioError::Unavailable);
        }
        state.closed = false;
        state.opened += 1;
        Ok(self.backend.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_with_issue_time() {
        let mut backend = OfflineBackend::new();
        backend.advance(1.5);
        backend.schedule_click(1.6, true, ClickMode::CountIn);
        backend.silence_notes();

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].issued_at, 1.5);
        assert_eq!(backend.clicks(), vec![(1.6, true, ClickMode::CountIn)]);
    }

    #[test]
    fn test_closed_backend_ignores_calls() {
        let mut backend = OfflineBackend::new();
        backend.close();
        backend.schedule_click(0.1, false, ClickMode::Normal);

        assert!(backend.is_closed());
        assert!(backend.clicks().is_empty());
        assert!(backend.resume().is_err());
    }

    #[test]
    fn test_factory_availability_and_reopen() {
        let handle = OfflineBackend::new();
        let mut factory = OfflineFactory::new(handle.clone());

        handle.set_available(false);
        assert!(factory.open().is_err());

        handle.set_available(true);
        let mut backend = factory.open().unwrap();
        backend.close();
        assert!(handle.is_closed());

        factory.open().unwrap();
        assert!(!handle.is_closed());
        assert_eq!(handle.open_count(), 2);
    }

    #[test]
    fn test_clock_never_goes_backwards_on_advance() {
        let backend = OfflineBackend::new();
        backend.advance(0.25);
        backend.advance(-1.0);
        assert_eq!(backend.now(), 0.25);
    }
}
