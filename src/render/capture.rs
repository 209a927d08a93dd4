// Capture - Sinks that log or record dispatch events instead of sounding them
// Used by the headless binary and by tests

use super::{RenderError, RenderSink, VisualSync, is_known_instrument};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;

/// One recorded render call
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub instrument_id: String,
    pub time: f64,
    pub gain: f32,
}

/// Render sink that writes every event to the log
///
/// Stands in for the synthesis engine: only catalogue presets and clicks
/// can be rendered.
#[derive(Debug, Default)]
pub struct LogSink {
    rendered: Cell<u64>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events rendered so far
    pub fn rendered(&self) -> u64 {
        self.rendered.get()
    }
}

impl RenderSink for LogSink {
    fn render(&self, instrument_id: &str, time: f64, gain: f32) -> Result<(), RenderError> {
        if !is_known_instrument(instrument_id) {
            return Err(RenderError::UnknownInstrument(instrument_id.to_string()));
        }
        self.rendered.set(self.rendered.get() + 1);
        tracing::info!(instrument = instrument_id, time, gain, "render");
        Ok(())
    }
}

/// Render sink that records calls and can be told to fail for some ids
#[derive(Debug, Default)]
pub struct CaptureSink {
    calls: RefCell<Vec<RenderCall>>,
    failing: RefCell<HashSet<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every render of `instrument_id` fail with a synthesis error
    pub fn fail_on(&self, instrument_id: &str) {
        self.failing.borrow_mut().insert(instrument_id.to_string());
    }

    /// Successful calls, in call order
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.borrow().clone()
    }

    /// Event times of the successful calls
    pub fn times(&self) -> Vec<f64> {
        self.calls.borrow().iter().map(|c| c.time).collect()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl RenderSink for CaptureSink {
    fn render(&self, instrument_id: &str, time: f64, gain: f32) -> Result<(), RenderError> {
        if self.failing.borrow().contains(instrument_id) {
            return Err(RenderError::Synthesis(format!("{instrument_id} failed")));
        }
        self.calls.borrow_mut().push(RenderCall {
            instrument_id: instrument_id.to_string(),
            time,
            gain,
        });
        Ok(())
    }
}

/// Visual sync that records every update
#[derive(Debug, Default)]
pub struct CaptureVisual {
    steps: RefCell<Vec<(usize, usize)>>,
    beats: RefCell<Vec<(usize, bool)>>,
    clears: Cell<usize>,
}

impl CaptureVisual {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(step, measure)` pairs received
    pub fn steps(&self) -> Vec<(usize, usize)> {
        self.steps.borrow().clone()
    }

    /// `(beat, accent)` pairs received
    pub fn beats(&self) -> Vec<(usize, bool)> {
        self.beats.borrow().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.get()
    }
}

impl VisualSync for CaptureVisual {
    fn on_step_due(&self, step: usize, measure: usize) {
        self.steps.borrow_mut().push((step, measure));
    }

    fn on_beat(&self, beat: usize, accent: bool) {
        self.beats.borrow_mut().push((beat, accent));
    }

    fn clear_highlight(&self) {
        self.clears.set(self.clears.get() + 1);
    }
}
