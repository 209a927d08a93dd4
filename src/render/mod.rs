// Render module - Contracts for the sound and display collaborators
// The sequencer only ever talks to these traits

pub mod capture;
pub mod router;

pub use capture::{CaptureSink, CaptureVisual, LogSink, RenderCall};
pub use router::{SoundSource, SourceRouter};

/// Preset ids offered by the instrument picker
pub const INSTRUMENTS: [&str; 16] = [
    "Kick 808",
    "Kick Punch",
    "Snare 808",
    "Snare Tight",
    "Ghost Snare",
    "Rim",
    "HiHat Closed",
    "HiHat Open",
    "HiHat Foot",
    "Tom 1",
    "Tom 2",
    "Floor Tom",
    "Ride",
    "Splash",
    "Clap",
    "Cowbell",
];

/// Reserved id for the metronome's downbeat click
pub const CLICK_ACCENT: &str = "Click Accent";

/// Reserved id for the metronome's other clicks
pub const CLICK: &str = "Click";

/// Whether `instrument_id` names a built-in preset or click
pub fn is_known_instrument(instrument_id: &str) -> bool {
    INSTRUMENTS.contains(&instrument_id) || instrument_id == CLICK || instrument_id == CLICK_ACCENT
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Sample not available for {0}")]
    SampleUnavailable(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

/// Consumer of dispatch events
///
/// Calls may carry times arbitrarily far in the future and must return
/// without waiting for them.
pub trait RenderSink {
    /// Play `instrument_id` at audio time `time` with linear gain 0..=1
    fn render(&self, instrument_id: &str, time: f64, gain: f32) -> Result<(), RenderError>;

    /// Play a metronome click
    fn click(&self, time: f64, accent: bool, gain: f32) -> Result<(), RenderError> {
        let id = if accent { CLICK_ACCENT } else { CLICK };
        self.render(id, time, gain)
    }
}

/// Consumer of wall-clock-aligned position updates for the grid display
pub trait VisualSync {
    /// A step has become audible
    fn on_step_due(&self, step: usize, measure: usize);

    /// A metronome beat has become audible
    fn on_beat(&self, _beat: usize, _accent: bool) {}

    /// Playback stopped; drop the playing highlight
    fn clear_highlight(&self) {}
}

/// Visual sync that ignores every update (headless use)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVisual;

impl VisualSync for NoVisual {
    fn on_step_due(&self, _step: usize, _measure: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue() {
        assert_eq!(INSTRUMENTS.len(), 16);
        assert!(is_known_instrument("Cowbell"));
        assert!(is_known_instrument(CLICK_ACCENT));
        assert!(!is_known_instrument("Theremin"));
    }

    #[test]
    fn test_default_click_maps_to_reserved_ids() {
        let sink = CaptureSink::new();
        sink.click(1.0, true, 0.5).unwrap();
        sink.click(1.5, false, 0.5).unwrap();

        let ids: Vec<_> = sink.calls().into_iter().map(|c| c.instrument_id).collect();
        assert_eq!(ids, [CLICK_ACCENT, CLICK]);
    }
}
