// GrooveStation headless runner
// Plays a short groove through the logging sink: groovestation [config.ron]

use groovestation::library::FileStore;
use groovestation::messaging::channels::drain;
use groovestation::render::{LogSink, NoVisual};
use groovestation::sequencer::SystemClock;
use groovestation::{DrumMachine, EngineConfig, PatternLibrary, SourceRouter, TransportClock};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long the pattern plays
const PLAY_TIME: Duration = Duration::from_secs(4);

/// How long the metronome clicks over the pattern
const METRONOME_TIME: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };

    let local = tokio::task::LocalSet::new();
    local.run_until(run(config)).await
}

async fn run(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let clock = SystemClock::suspended();
    let library = PatternLibrary::new(FileStore::new(config.library_dir()));
    let (machine, mut notifications) = DrumMachine::new(
        &config,
        TransportClock::new(clock.clone()),
        SourceRouter::new(Rc::new(LogSink::new())),
        Rc::new(NoVisual),
        library,
    )?;

    // Kick on 1 and 3, snare on 2 and 4, closed hats on eighths
    let steps = machine.store().steps_per_measure();
    for step in (0..steps).step_by(2) {
        if step % 8 == 0 {
            machine.toggle_step(0, 0, step)?;
        }
        if step % 8 == 4 {
            machine.toggle_step(1, 0, step)?;
        }
        machine.toggle_step(2, 0, step)?;
    }

    // Start is queued until the clock comes up
    let state = machine.play();
    tracing::info!(?state, "Play requested");
    clock.resume();

    machine.metronome().start();
    tokio::time::sleep(METRONOME_TIME).await;
    machine.metronome().stop();

    tokio::time::sleep(PLAY_TIME.saturating_sub(METRONOME_TIME)).await;
    machine.stop();

    let id = machine.save_pattern("Headless groove")?;
    tracing::info!(id, library = %config.library_dir().display(), "Groove saved");

    for notification in drain(&mut notifications) {
        tracing::info!("{notification}");
    }
    Ok(())
}
