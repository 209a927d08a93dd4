// Snapshot - Serialized form of a saved pattern (current schema)

use crate::library::LibraryError;
use crate::sequencer::pattern::{MAX_MEASURES, MAX_VOLUME, MIN_MEASURES, MIN_VOLUME};
use crate::sequencer::{Pattern, StepGrid, Tempo, TimeSignature, Track};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written by this build
pub const SNAPSHOT_VERSION: u32 = 2;

/// Name given to patterns saved without one
pub const UNTITLED: &str = "Untitled";

/// A saved pattern as stored in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSnapshot {
    pub version: u32,
    #[serde(deserialize_with = "crate::library::migration::deserialize_id")]
    pub id: u64,
    pub name: String,
    pub bpm: u32,
    pub total_measures: usize,
    pub time_signature: TimeSignature,
    pub tracks: Vec<TrackSnapshot>,
    pub date: DateTime<Utc>,
}

/// One track of a saved pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub name: String,
    #[serde(alias = "key")]
    pub instrument_id: String,
    pub volume: u8,
    pub measures: Vec<Vec<bool>>,
}

impl PatternSnapshot {
    /// Capture `pattern` under `name`; a blank name becomes "Untitled"
    pub fn capture(id: u64, name: &str, pattern: &Pattern, date: DateTime<Utc>) -> Self {
        let name = match name.trim() {
            "" => UNTITLED,
            trimmed => trimmed,
        };
        Self {
            version: SNAPSHOT_VERSION,
            id,
            name: name.to_string(),
            bpm: pattern.tempo().bpm(),
            total_measures: pattern.total_measures(),
            time_signature: pattern.time_signature(),
            tracks: pattern.tracks().iter().map(TrackSnapshot::from).collect(),
            date,
        }
    }

    /// Rebuild the pattern, padding or trimming grids to fit
    pub fn to_pattern(&self) -> Result<Pattern, LibraryError> {
        validate_snapshot(self)?;
        let tempo = Tempo::new(self.bpm).map_err(|e| LibraryError::Validation(e.to_string()))?;

        let tracks = self
            .tracks
            .iter()
            .map(|t| {
                let measures = t.measures.iter().cloned().map(StepGrid::from_steps).collect();
                Track::from_measures(&t.name, &t.instrument_id, t.volume, measures)
                    .map_err(|e| LibraryError::Validation(format!("{}: {}", t.name, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pattern::from_parts(
            tempo,
            self.time_signature,
            self.total_measures,
            tracks,
        ))
    }
}

impl From<&Track> for TrackSnapshot {
    fn from(track: &Track) -> Self {
        Self {
            name: track.name.clone(),
            instrument_id: track.instrument_id.clone(),
            volume: track.volume(),
            measures: track
                .measures()
                .iter()
                .map(|grid| grid.as_slice().to_vec())
                .collect(),
        }
    }
}

/// Check a snapshot's ranges before it is turned back into a pattern
pub fn validate_snapshot(snapshot: &PatternSnapshot) -> Result<(), LibraryError> {
    if snapshot.name.trim().is_empty() {
        return Err(LibraryError::Validation(
            "Pattern name cannot be empty".to_string(),
        ));
    }

    if snapshot.name.len() > 255 {
        return Err(LibraryError::Validation(
            "Pattern name cannot exceed 255 characters".to_string(),
        ));
    }

    if !(Tempo::MIN_BPM..=Tempo::MAX_BPM).contains(&snapshot.bpm) {
        return Err(LibraryError::Validation(format!(
            "Tempo must be between {} and {} BPM",
            Tempo::MIN_BPM,
            Tempo::MAX_BPM
        )));
    }

    if !(MIN_MEASURES..=MAX_MEASURES).contains(&snapshot.total_measures) {
        return Err(LibraryError::Validation(format!(
            "Measure count must be between {} and {}",
            MIN_MEASURES, MAX_MEASURES
        )));
    }

    for track in &snapshot.tracks {
        if track.instrument_id.trim().is_empty() {
            return Err(LibraryError::Validation(format!(
                "Track '{}' has no instrument",
                track.name
            )));
        }
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&track.volume) {
            return Err(LibraryError::Validation(format!(
                "Track '{}' volume must be between {} and {}",
                track.name, MIN_VOLUME, MAX_VOLUME
            )));
        }
    }

    Ok(())
}
