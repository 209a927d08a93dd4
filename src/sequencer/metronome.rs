// Metronome - Click track scheduled independently of pattern playback
// Same look-ahead loop as the player, one unit per beat

use crate::render::{RenderSink, VisualSync};
use crate::sequencer::clock::TransportClock;
use crate::sequencer::scheduler::{Cadence, Drive, LookAhead, Scheduler, SchedulerState};
use crate::sequencer::timeline::{InvalidTempo, Tempo, TimeSignature};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Click on first beat of bar (accent/downbeat)
    Accent,
    /// Click on other beats
    Regular,
}

impl ClickType {
    pub fn for_beat(beat: usize) -> Self {
        if beat == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }

    pub fn is_accent(&self) -> bool {
        matches!(self, ClickType::Accent)
    }
}

/// A beat that was dispatched, delivered to the display once audible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    pub index: usize,
    pub click: ClickType,
}

/// Metronome tempo, meter and click level
///
/// Independent of the pattern's tempo and signature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    #[serde(rename = "bpm")]
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    /// Click gain, 0.0 to 1.0
    pub volume: f32,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            time_signature: TimeSignature::default(),
            volume: 0.5,
        }
    }
}

/// Click cadence: one unit is one quarter-note beat
pub struct ClickCadence {
    settings: Cell<MetronomeSettings>,
    sink: Rc<dyn RenderSink>,
    visual: Rc<dyn VisualSync>,
}

impl ClickCadence {
    pub fn new(
        settings: MetronomeSettings,
        sink: Rc<dyn RenderSink>,
        visual: Rc<dyn VisualSync>,
    ) -> Self {
        Self {
            settings: Cell::new(settings),
            sink,
            visual,
        }
    }

    pub fn settings(&self) -> MetronomeSettings {
        self.settings.get()
    }

    fn update(&self, edit: impl FnOnce(&mut MetronomeSettings)) {
        let mut settings = self.settings.get();
        edit(&mut settings);
        self.settings.set(settings);
    }
}

impl Cadence for ClickCadence {
    type Position = usize;
    type Cue = Beat;
    const NAME: &'static str = "metronome";

    fn units_per_measure(&self) -> usize {
        self.settings.get().time_signature.beats_per_measure()
    }

    fn unit_seconds(&self) -> f64 {
        self.settings.get().tempo.seconds_per_beat()
    }

    fn dispatch(&self, beat: usize, time: f64) -> Option<Beat> {
        let click = ClickType::for_beat(beat);
        let volume = self.settings.get().volume;
        if let Err(e) = self.sink.click(time, click.is_accent(), volume) {
            tracing::warn!(beat, error = %e, "Click render failed");
        }
        Some(Beat { index: beat, click })
    }

    fn advance(&self, beat: usize) -> usize {
        (beat + 1) % self.units_per_measure().max(1)
    }

    fn fire(&self, cue: Beat) {
        self.visual.on_beat(cue.index, cue.click.is_accent());
    }
}

/// Metronome scheduler with its own cursor and settings
#[derive(Debug, Clone)]
pub struct Metronome {
    scheduler: Scheduler<ClickCadence>,
}

impl Metronome {
    pub fn new(
        settings: MetronomeSettings,
        sink: Rc<dyn RenderSink>,
        visual: Rc<dyn VisualSync>,
        clock: TransportClock,
        lookahead: LookAhead,
        drive: Drive,
    ) -> Self {
        let cadence = Rc::new(ClickCadence::new(settings, sink, visual));
        Self {
            scheduler: Scheduler::new(cadence, clock, lookahead, drive),
        }
    }

    /// # Panics
    ///
    /// Needs a tokio `LocalSet` under [`Drive::Interval`], see
    /// [`Scheduler::start`].
    pub fn start(&self) -> SchedulerState {
        self.scheduler.start()
    }

    pub fn stop(&self) {
        self.scheduler.stop()
    }

    pub fn toggle(&self) -> SchedulerState {
        self.scheduler.toggle()
    }

    pub fn poll(&self) -> usize {
        self.scheduler.poll()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Beat the next click will sound on
    pub fn current_beat(&self) -> usize {
        self.scheduler.cursor().position
    }

    /// Audio time of the next click
    pub fn next_beat_time(&self) -> f64 {
        self.scheduler.cursor().next_event_time
    }

    pub fn settings(&self) -> MetronomeSettings {
        self.scheduler.cadence().settings()
    }

    pub fn set_bpm(&self, bpm: u32) -> Result<(), InvalidTempo> {
        let tempo = Tempo::new(bpm)?;
        self.scheduler.cadence().update(|s| s.tempo = tempo);
        Ok(())
    }

    /// Change the meter; while active the count restarts on the downbeat
    pub fn set_time_signature(&self, time_signature: TimeSignature) {
        self.scheduler
            .cadence()
            .update(|s| s.time_signature = time_signature);
        if self.scheduler.state().is_active() {
            self.scheduler.set_position(0);
        }
    }

    /// Set click volume (0.0 to 1.0)
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.scheduler.cadence().update(|s| s.volume = volume);
    }
}
