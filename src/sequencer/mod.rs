// Sequencer module - Pattern model, transport clock and look-ahead scheduling
// Playback and metronome share one poll-and-drain scheduler

pub mod clock;
pub mod metronome;
pub mod pattern;
pub mod player;
pub mod scheduler;
pub mod timeline;

pub use clock::{AudioClock, SampleClock, SystemClock, TransportClock};
pub use metronome::{Beat, ClickCadence, ClickType, Metronome, MetronomeSettings};
pub use pattern::{Pattern, PatternError, PatternStore, StepGrid, Track};
pub use player::{PatternCadence, PatternScheduler, RestartPolicy, StepPosition};
pub use scheduler::{Cadence, Cursor, Dispatched, Drive, LookAhead, Scheduler, SchedulerState};
pub use timeline::{Tempo, TimeSignature};
