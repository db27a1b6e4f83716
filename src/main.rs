// Entry point: console metronome, offline WAV export and sync inspection.
mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Args;
use practice_metronome::audio::backend::ClockSource;
use practice_metronome::config::MetronomeConfig;
use practice_metronome::driver::{self, ControlCommand, Feedback};
use practice_metronome::sequencer::LogObserver;
use practice_metronome::sequencer::inspector::DEFAULT_UPCOMING_BEATS;
use practice_metronome::{
    AudioExporter, BackendFactory, BeatHistory, CpalFactory, ExportSettings, InstrumentBank,
    Metronome, OfflineBackend, OfflineFactory,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

fn config_path(args: &Args) -> Result<PathBuf> {
    match &args.config {
        Some(path) => Ok(path.clone()),
        None => MetronomeConfig::default_path().context("Locating configuration"),
    }
}

fn read_midi(args: &Args) -> Result<Option<Vec<u8>>> {
    let Some(path) = &args.midi else {
        return Ok(None);
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Reading MIDI file {}", path.display()))?;
    // Fail before any audio is opened
    practice_metronome::midi::parse(&bytes)
        .with_context(|| format!("Parsing MIDI file {}", path.display()))?;
    Ok(Some(bytes))
}

fn build_metronome<F: BackendFactory>(
    factory: F,
    config: &MetronomeConfig,
    midi: Option<&[u8]>,
    arm: bool,
) -> Result<Metronome<F>> {
    let mut metronome = Metronome::new(
        factory,
        config.scheduler_settings(),
        config.transport_state(),
        config.accompaniment_state(),
    );
    metronome.add_observer(Box::new(LogObserver));
    if let Some(bytes) = midi {
        metronome
            .load_accompaniment(bytes)
            .context("Loading accompaniment")?;
    }
    if arm {
        metronome.arm();
    }
    Ok(metronome)
}

fn run_offline(args: &Args, config: &MetronomeConfig, midi: Option<&[u8]>) -> Result<()> {
    let backend = OfflineBackend::new();
    let mut metronome =
        build_metronome(OfflineFactory::new(backend.clone()), config, midi, args.arm)?;
    let history = BeatHistory::default();
    metronome.add_observer(Box::new(history.clone()));

    let seconds = args.seconds.max(0.0);
    let step = metronome.settings().lookahead_secs;
    metronome.start();
    while backend.now() < seconds && metronome.is_running() {
        backend.advance(step);
        metronome.tick();
    }

    if let Some(path) = &args.export {
        let exporter = AudioExporter::new(ExportSettings {
            output_path: path.clone(),
            master_volume: config.audio.master_volume,
            ..ExportSettings::default()
        });
        let bank = InstrumentBank::load(&config.accompaniment.instruments);
        let summary = exporter
            .export(&backend.calls(), seconds, &bank, config.accompaniment.synth)
            .with_context(|| format!("Exporting to {}", path.display()))?;
        println!(
            "Wrote {} ({} clicks, {} notes, peak {:.2})",
            path.display(),
            summary.clicks,
            summary.notes,
            summary.peak
        );
    }

    if args.inspect {
        let snapshot = metronome.snapshot(DEFAULT_UPCOMING_BEATS).with_history(&history);
        println!("{}", snapshot.to_json()?);
    }
    Ok(())
}

fn run_interactive(config: &MetronomeConfig, midi: Option<Vec<u8>>, arm: bool) -> Result<()> {
    let bank = InstrumentBank::load(&config.accompaniment.instruments);
    let factory = CpalFactory::new(config.engine_options(), bank);
    let thread_config = config.clone();

    let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
    let (commands, driver_handle) = driver::spawn(
        move || match build_metronome(factory.clone(), &thread_config, midi.as_deref(), arm) {
            Ok(metronome) => metronome,
            Err(e) => {
                log::error!("{:#}", e);
                Metronome::new(
                    factory,
                    thread_config.scheduler_settings(),
                    thread_config.transport_state(),
                    thread_config.accompaniment_state(),
                )
            }
        },
        feedback_tx,
    )
    .context("Spawning driver thread")?;

    thread::Builder::new()
        .name("feedback".into())
        .spawn(move || {
            for feedback in feedback_rx {
                match feedback {
                    Feedback::Snapshot(json) => println!("{}", json),
                    Feedback::Error(message) => eprintln!("ERROR: {}", message),
                }
            }
        })
        .context("Spawning feedback thread")?;

    println!("Commands: start, stop, panic, bpm N, meter N/D, pattern all|24|1|off,");
    println!("          countin N, arm, disarm, midi on|off, volume V, instrument ID,");
    println!("          load FILE, clear, resync, inspect, quit");

    for line in std::io::stdin().lock().lines() {
        let line = line.context("Reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ControlCommand>() {
            Ok(command) => {
                let quit = command == ControlCommand::Quit;
                if commands.send(command).is_err() || quit {
                    break;
                }
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    // Closing the channel also ends the driver on EOF
    drop(commands);
    if driver_handle.join().is_err() {
        log::error!("Driver thread panicked");
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let path = config_path(&args)?;
    let mut config = MetronomeConfig::load_or_default(&path)
        .with_context(|| format!("Loading configuration from {}", path.display()))?;
    args.apply(&mut config);

    if args.save_config {
        config
            .save(&path)
            .with_context(|| format!("Saving configuration to {}", path.display()))?;
        log::info!("Configuration saved to {}", path.display());
    }

    let midi = read_midi(&args)?;
    if args.is_offline() {
        run_offline(&args, &config, midi.as_deref())
    } else {
        run_interactive(&config, midi, args.arm)
    }
}
