// Driver - Runs a Metronome on its own thread
//
// The metronome never leaves the thread it was built on (the cpal stream is
// not Send). Control arrives over a crossbeam channel; between commands the
// loop wakes once per lookahead period to tick the scheduler.

use crate::audio::backend::BackendFactory;
use crate::sequencer::inspector::{BeatHistory, DEFAULT_UPCOMING_BEATS};
use crate::sequencer::scheduler::Metronome;
use crate::sequencer::timeline::TimeSignature;
use crate::sequencer::transport::ClickPattern;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start,
    Stop,
    Panic,
    SetTempo(f64),
    SetMeter(TimeSignature),
    SetPattern(ClickPattern),
    SetCountIn(u32),
    Arm,
    Disarm,
    SetAccompanimentEnabled(bool),
    SetVolume(f32),
    SetInstrument(String),
    LoadAccompaniment(PathBuf),
    ClearAccompaniment,
    Resync,
    Inspect,
    Quit,
}

impl FromStr for ControlCommand {
    type Err = String;

    /// One console line: `start`, `bpm 90`, `meter 7/8`, `midi off`, ...
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "Empty command".to_string())?;
        let arg = words.collect::<Vec<_>>().join(" ");

        let number = |what: &str| -> Result<f64, String> {
            arg.parse::<f64>()
                .map_err(|_| format!("'{}' expects a number, got '{}'", what, arg))
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" | "play" => ControlCommand::Start,
            "stop" => ControlCommand::Stop,
            "panic" => ControlCommand::Panic,
            "bpm" | "tempo" => ControlCommand::SetTempo(number("bpm")?),
            "meter" => ControlCommand::SetMeter(
                TimeSignature::parse(&arg).ok_or_else(|| format!("Invalid meter: '{}'", arg))?,
            ),
            "pattern" => ControlCommand::SetPattern(arg.parse()?),
            "countin" | "count-in" => ControlCommand::SetCountIn(number("count-in")?.max(0.0) as u32),
            "arm" => ControlCommand::Arm,
            "disarm" => ControlCommand::Disarm,
            "midi" => match arg.as_str() {
                "on" => ControlCommand::SetAccompanimentEnabled(true),
                "off" => ControlCommand::SetAccompanimentEnabled(false),
                _ => return Err(format!("'midi' expects on|off, got '{}'", arg)),
            },
            "volume" => ControlCommand::SetVolume(number("volume")? as f32),
            "instrument" if !arg.is_empty() => ControlCommand::SetInstrument(arg),
            "load" if !arg.is_empty() => ControlCommand::LoadAccompaniment(PathBuf::from(arg)),
            "clear" => ControlCommand::ClearAccompaniment,
            "resync" => ControlCommand::Resync,
            "inspect" => ControlCommand::Inspect,
            "quit" | "exit" => ControlCommand::Quit,
            _ => return Err(format!("Unknown command: '{}'", line.trim())),
        };
        Ok(command)
    }
}

/// Sent back from the driver thread
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// Sync inspector snapshot as JSON
    Snapshot(String),
    Error(String),
}

pub struct Driver<F: BackendFactory> {
    metronome: Metronome<F>,
    history: BeatHistory,
    feedback: Sender<Feedback>,
}

impl<F: BackendFactory> Driver<F> {
    pub fn new(mut metronome: Metronome<F>, feedback: Sender<Feedback>) -> Self {
        let history = BeatHistory::default();
        metronome.add_observer(Box::new(history.clone()));
        Self {
            metronome,
            history,
            feedback,
        }
    }

    pub fn metronome(&self) -> &Metronome<F> {
        &self.metronome
    }

    /// Apply one command. Returns true when the loop should exit.
    pub fn handle(&mut self, command: ControlCommand) -> bool {
        log::debug!("Driver command: {:?}", command);
        match command {
            ControlCommand::Start => self.metronome.start(),
            ControlCommand::Stop => self.metronome.stop(),
            ControlCommand::Panic => self.metronome.panic(),
            ControlCommand::SetTempo(bpm) => self.metronome.set_tempo(bpm),
            ControlCommand::SetMeter(ts) => self.metronome.set_meter(ts),
            ControlCommand::SetPattern(pattern) => self.metronome.set_click_pattern(pattern),
            ControlCommand::SetCountIn(bars) => self.metronome.set_count_in_bars(bars),
            ControlCommand::Arm => self.metronome.arm(),
            ControlCommand::Disarm => self.metronome.disarm(),
            ControlCommand::SetAccompanimentEnabled(on) => {
                self.metronome.set_accompaniment_enabled(on)
            }
            ControlCommand::SetVolume(volume) => self.metronome.set_accompaniment_volume(volume),
            ControlCommand::SetInstrument(id) => self.metronome.set_instrument(&id),
            ControlCommand::LoadAccompaniment(path) => self.load(path),
            ControlCommand::ClearAccompaniment => self.metronome.clear_accompaniment(),
            ControlCommand::Resync => self.metronome.resync(),
            ControlCommand::Inspect => {
                let snapshot = self
                    .metronome
                    .snapshot(DEFAULT_UPCOMING_BEATS)
                    .with_history(&self.history);
                match snapshot.to_json() {
                    Ok(json) => self.send(Feedback::Snapshot(json)),
                    Err(e) => self.send(Feedback::Error(format!("Snapshot failed: {}", e))),
                }
            }
            ControlCommand::Quit => return true,
        }
        false
    }

    fn load(&mut self, path: PathBuf) {
        let result = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.metronome
                    .load_accompaniment(&bytes)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => log::info!("Accompaniment loaded from {}", path.display()),
            Err(e) => self.send(Feedback::Error(format!("{}: {}", path.display(), e))),
        }
    }

    fn send(&self, feedback: Feedback) {
        if self.feedback.send(feedback).is_err() {
            log::debug!("Feedback receiver gone");
        }
    }

    /// Process commands and tick until `Quit` or the sender hangs up.
    /// The backend is closed on the way out.
    pub fn run(mut self, commands: Receiver<ControlCommand>) {
        let lookahead = self.metronome.lookahead();
        let mut next_tick = Instant::now();

        loop {
            match commands.recv_deadline(next_tick) {
                Ok(command) => {
                    if self.handle(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if now >= next_tick {
                self.metronome.tick();
                next_tick = now + lookahead;
            }
        }

        self.metronome.panic();
        log::info!("Driver stopped");
    }
}

/// Build the metronome on a new thread and drive it there
pub fn spawn<F, B>(
    build: B,
    feedback: Sender<Feedback>,
) -> std::io::Result<(Sender<ControlCommand>, JoinHandle<()>)>
where
    F: BackendFactory + 'static,
    B: FnOnce() -> Metronome<F> + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = thread::Builder::new()
        .name("metronome-driver".into())
        .spawn(move || Driver::new(build(), feedback).run(rx))?;
    Ok((tx, handle))
}
