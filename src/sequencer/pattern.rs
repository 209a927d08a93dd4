// Pattern - Tracks x measures x steps grid edited by the user
// The store keeps every grid sized to the current signature and measure count

use crate::sequencer::timeline::{InvalidTempo, Tempo, TimeSignature};
use serde::{Deserialize, Serialize};

/// Upper bound on measures in a pattern
pub const MAX_MEASURES: usize = 10;

/// A pattern always keeps at least one measure
pub const MIN_MEASURES: usize = 1;

/// Track volume levels run 1..=5 and map to gain `level / 5`
pub const MIN_VOLUME: u8 = 1;
pub const MAX_VOLUME: u8 = 5;
pub const DEFAULT_VOLUME: u8 = 4;

/// Pattern editing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Max {0} measures!")]
    TooManyMeasures(usize),

    #[error("Cannot remove the last measure!")]
    LastMeasure,

    #[error("Track index {index} out of range ({len} tracks)")]
    TrackOutOfRange { index: usize, len: usize },

    #[error("Step {step} of measure {measure} is outside the grid")]
    StepOutOfRange { measure: usize, step: usize },

    #[error("Volume must be between 1 and 5, got {0}")]
    InvalidVolume(u8),

    #[error(transparent)]
    InvalidTempo(#[from] InvalidTempo),
}

/// One measure of on/off steps for a single track
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepGrid {
    steps: Vec<bool>,
}

impl StepGrid {
    /// Create an all-off grid
    pub fn new(len: usize) -> Self {
        Self {
            steps: vec![false; len],
        }
    }

    /// Wrap existing step flags
    pub fn from_steps(steps: Vec<bool>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether `step` is on; indices past the end read as off
    pub fn is_active(&self, step: usize) -> bool {
        self.steps.get(step).copied().unwrap_or(false)
    }

    /// Flip one step and return its new state
    pub fn toggle(&mut self, step: usize) -> Option<bool> {
        let slot = self.steps.get_mut(step)?;
        *slot = !*slot;
        Some(*slot)
    }

    /// Grow or shrink to `len`, keeping indices below `min(old, new)` and
    /// filling new slots with off
    pub fn resize(&mut self, len: usize) {
        self.steps.resize(len, false);
    }

    /// Turn every step off
    pub fn clear(&mut self) {
        self.steps.iter_mut().for_each(|s| *s = false);
    }

    /// Indices of the active steps
    pub fn active_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.steps
    }
}

/// A percussion track: an instrument plus one step grid per measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Display name
    pub name: String,

    /// Render Sink preset, opaque to the sequencer
    pub instrument_id: String,

    volume: u8,

    measures: Vec<StepGrid>,
}

impl Track {
    /// Create an empty track sized for `total_measures` x `steps_per_measure`
    pub fn new(
        name: impl Into<String>,
        instrument_id: impl Into<String>,
        volume: u8,
        total_measures: usize,
        steps_per_measure: usize,
    ) -> Result<Self, PatternError> {
        check_volume(volume)?;
        Ok(Self {
            name: name.into(),
            instrument_id: instrument_id.into(),
            volume,
            measures: vec![StepGrid::new(steps_per_measure); total_measures],
        })
    }

    /// Create a track from stored grids without resizing them
    pub fn from_measures(
        name: impl Into<String>,
        instrument_id: impl Into<String>,
        volume: u8,
        measures: Vec<StepGrid>,
    ) -> Result<Self, PatternError> {
        check_volume(volume)?;
        Ok(Self {
            name: name.into(),
            instrument_id: instrument_id.into(),
            volume,
            measures,
        })
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Linear gain handed to the Render Sink
    pub fn gain(&self) -> f32 {
        self.volume as f32 / MAX_VOLUME as f32
    }

    pub fn measures(&self) -> &[StepGrid] {
        &self.measures
    }

    pub fn measure(&self, index: usize) -> Option<&StepGrid> {
        self.measures.get(index)
    }

    /// Whether the step is on; a missing measure reads as all-off
    pub fn is_active(&self, measure: usize, step: usize) -> bool {
        self.measures
            .get(measure)
            .is_some_and(|grid| grid.is_active(step))
    }

    fn set_volume(&mut self, level: u8) -> Result<(), PatternError> {
        check_volume(level)?;
        self.volume = level;
        Ok(())
    }

    fn fit(&mut self, total_measures: usize, steps_per_measure: usize) {
        self.measures
            .resize_with(total_measures, || StepGrid::new(steps_per_measure));
        for grid in &mut self.measures {
            grid.resize(steps_per_measure);
        }
    }
}

fn check_volume(level: u8) -> Result<(), PatternError> {
    if (MIN_VOLUME..=MAX_VOLUME).contains(&level) {
        Ok(())
    } else {
        Err(PatternError::InvalidVolume(level))
    }
}

/// A complete drum pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tempo: Tempo,
    time_signature: TimeSignature,
    total_measures: usize,
    tracks: Vec<Track>,
}

impl Pattern {
    /// Create an empty pattern with no tracks
    pub fn new(tempo: Tempo, time_signature: TimeSignature, total_measures: usize) -> Self {
        Self {
            tempo,
            time_signature,
            total_measures: total_measures.clamp(MIN_MEASURES, MAX_MEASURES),
            tracks: Vec::new(),
        }
    }

    /// Build a pattern from stored parts, padding or trimming every track so
    /// the grid invariant holds
    pub fn from_parts(
        tempo: Tempo,
        time_signature: TimeSignature,
        total_measures: usize,
        tracks: Vec<Track>,
    ) -> Self {
        let mut pattern = Self::new(tempo, time_signature, total_measures);
        pattern.tracks = tracks;
        pattern.normalize();
        pattern
    }

    /// The five-track kit a fresh session starts with
    pub fn default_kit() -> Self {
        let mut pattern = Self::new(Tempo::default(), TimeSignature::default(), 1);
        let steps = pattern.steps_per_measure();
        for (name, instrument, volume) in [
            ("Kick", "Kick 808", 4),
            ("Snare", "Snare 808", 4),
            ("HiHat Closed", "HiHat Closed", 3),
            ("Ride", "Ride", 3),
            ("Splash", "Splash", 3),
        ] {
            pattern.tracks.push(Track {
                name: name.to_string(),
                instrument_id: instrument.to_string(),
                volume,
                measures: vec![StepGrid::new(steps); 1],
            });
        }
        pattern
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn total_measures(&self) -> usize {
        self.total_measures
    }

    pub fn steps_per_measure(&self) -> usize {
        self.time_signature.steps_per_measure()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Tracks with `step` of `measure` switched on, in track-list order
    pub fn hits_at(&self, measure: usize, step: usize) -> impl Iterator<Item = &Track> + '_ {
        self.tracks
            .iter()
            .filter(move |track| track.is_active(measure, step))
    }

    fn normalize(&mut self) {
        let (measures, steps) = (self.total_measures, self.steps_per_measure());
        for track in &mut self.tracks {
            track.fit(measures, steps);
        }
    }

    fn track_mut(&mut self, index: usize) -> Result<&mut Track, PatternError> {
        let len = self.tracks.len();
        self.tracks
            .get_mut(index)
            .ok_or(PatternError::TrackOutOfRange { index, len })
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::default_kit()
    }
}

/// Owner of the live pattern plus the measure the grid is showing
///
/// Every mutation completes before it returns, so a scheduler poll never
/// observes a half-resized grid.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    pattern: Pattern,
    viewed_measure: usize,
}

impl PatternStore {
    /// Create a store around an existing pattern
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            viewed_measure: 0,
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Swap in a whole pattern (library load); the view returns to measure 0
    pub fn replace(&mut self, mut pattern: Pattern) {
        pattern.normalize();
        self.pattern = pattern;
        self.viewed_measure = 0;
    }

    pub fn tracks(&self) -> &[Track] {
        self.pattern.tracks()
    }

    pub fn tempo(&self) -> Tempo {
        self.pattern.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.pattern.time_signature
    }

    pub fn total_measures(&self) -> usize {
        self.pattern.total_measures
    }

    pub fn steps_per_measure(&self) -> usize {
        self.pattern.steps_per_measure()
    }

    /// Measure currently displayed by the grid (UI only)
    pub fn viewed_measure(&self) -> usize {
        self.viewed_measure
    }

    /// Append a track with an empty grid; returns its index
    ///
    /// An empty display name falls back to the instrument id.
    pub fn add_track(&mut self, instrument_id: &str, display_name: &str) -> usize {
        let name = if display_name.trim().is_empty() {
            instrument_id
        } else {
            display_name
        };
        self.pattern.tracks.push(Track {
            name: name.to_string(),
            instrument_id: instrument_id.to_string(),
            volume: DEFAULT_VOLUME,
            measures: vec![
                StepGrid::new(self.pattern.steps_per_measure());
                self.pattern.total_measures
            ],
        });
        self.pattern.tracks.len() - 1
    }

    /// Delete a track by index
    pub fn remove_track(&mut self, index: usize) -> Result<Track, PatternError> {
        let len = self.pattern.tracks.len();
        if index >= len {
            return Err(PatternError::TrackOutOfRange { index, len });
        }
        Ok(self.pattern.tracks.remove(index))
    }

    /// Set a track's volume level (1..=5)
    pub fn set_volume(&mut self, index: usize, level: u8) -> Result<(), PatternError> {
        self.pattern.track_mut(index)?.set_volume(level)
    }

    /// Flip one step and return its new state
    pub fn toggle_step(
        &mut self,
        track_index: usize,
        measure: usize,
        step: usize,
    ) -> Result<bool, PatternError> {
        self.pattern
            .track_mut(track_index)?
            .measures
            .get_mut(measure)
            .and_then(|grid| grid.toggle(step))
            .ok_or(PatternError::StepOutOfRange { measure, step })
    }

    /// Change the signature and resize every grid to its step count
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.pattern.time_signature = time_signature;
        self.pattern.normalize();
    }

    /// Change the tempo
    pub fn set_bpm(&mut self, bpm: u32) -> Result<(), PatternError> {
        self.pattern.tempo = Tempo::new(bpm)?;
        Ok(())
    }

    /// Append an empty measure to every track; returns the new total
    pub fn add_measure(&mut self) -> Result<usize, PatternError> {
        if self.pattern.total_measures >= MAX_MEASURES {
            return Err(PatternError::TooManyMeasures(MAX_MEASURES));
        }
        self.pattern.total_measures += 1;
        self.pattern.normalize();
        self.viewed_measure = self.pattern.total_measures - 1;
        Ok(self.pattern.total_measures)
    }

    /// Drop the last measure from every track; returns the new total
    pub fn remove_measure(&mut self) -> Result<usize, PatternError> {
        if self.pattern.total_measures <= MIN_MEASURES {
            return Err(PatternError::LastMeasure);
        }
        self.pattern.total_measures -= 1;
        self.pattern.normalize();
        self.viewed_measure = self.viewed_measure.min(self.pattern.total_measures - 1);
        Ok(self.pattern.total_measures)
    }

    /// Move the viewed measure by `delta`; out-of-range moves are ignored
    pub fn view_measure(&mut self, delta: isize) -> bool {
        match self.viewed_measure.checked_add_signed(delta) {
            Some(target) if target < self.pattern.total_measures => {
                self.viewed_measure = target;
                true
            }
            _ => false,
        }
    }

    /// Turn off every step of every track
    pub fn clear_steps(&mut self) {
        for track in &mut self.pattern.tracks {
            track.measures.iter_mut().for_each(StepGrid::clear);
        }
    }
}
