// GrooveStation - Library exports for the binary, tests and benchmarks

pub mod config;
pub mod library;
pub mod machine;
pub mod messaging;
pub mod render;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use config::{ConfigError, EngineConfig, SchedulerConfig};
pub use library::{LibraryError, PatternLibrary, PatternSnapshot};
pub use machine::DrumMachine;
pub use messaging::{Notification, NotificationCategory, NotificationLevel};
pub use render::{RenderError, RenderSink, SoundSource, SourceRouter, VisualSync};
pub use sequencer::{
    Metronome, Pattern, PatternError, PatternScheduler, PatternStore, RestartPolicy,
    SchedulerState, Tempo, TimeSignature, TransportClock,
};
