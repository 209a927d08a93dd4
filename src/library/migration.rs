// Snapshot format migration
// Upgrades stored records to the current schema before they reach the core

use crate::library::LibraryError;
use crate::library::snapshot::{PatternSnapshot, SNAPSHOT_VERSION, TrackSnapshot, UNTITLED};
use crate::sequencer::TimeSignature;
use crate::sequencer::pattern::DEFAULT_VOLUME;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Steps in a legacy track with no grid at all
const LEGACY_STEPS: usize = 32;

/// Migration result
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// Snapshot in the current schema
    pub snapshot: PatternSnapshot,
    /// Whether an upgrade was performed
    pub migrated: bool,
    /// Migration messages/warnings
    pub messages: Vec<String>,
}

/// Compatibility information for a stored schema version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityInfo {
    pub can_load: bool,
    pub needs_migration: bool,
    pub warning: Option<String>,
}

/// Schema version of a raw record; records without one are version 1
pub fn record_version(record: &Value) -> u32 {
    record
        .get("version")
        .and_then(Value::as_u64)
        .map(|v| v.min(u32::MAX as u64) as u32)
        .unwrap_or(1)
}

/// Id of a raw record, if it has a usable one
pub fn record_id(record: &Value) -> Option<u64> {
    id_from_value(record.get("id")?)
}

/// Ids were written as plain numbers, so `12.0` is the same record as `12`
fn id_from_value(id: &Value) -> Option<u64> {
    id.as_u64().or_else(|| {
        id.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

/// Deserialize a record id with the same rules as [`record_id`]
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| de::Error::custom(format!("invalid pattern id: {value}")))
}

/// Check whether records of `version` can be loaded
pub fn check_compatibility(version: u32) -> CompatibilityInfo {
    if version > SNAPSHOT_VERSION {
        return CompatibilityInfo {
            can_load: false,
            needs_migration: false,
            warning: Some(format!(
                "Pattern format v{} is newer than current v{}",
                version, SNAPSHOT_VERSION
            )),
        };
    }

    if version == SNAPSHOT_VERSION {
        return CompatibilityInfo {
            can_load: true,
            needs_migration: false,
            warning: None,
        };
    }

    CompatibilityInfo {
        can_load: true,
        needs_migration: true,
        warning: Some(format!(
            "Pattern format v{} will be migrated to v{}",
            version, SNAPSHOT_VERSION
        )),
    }
}

/// Parse a stored record, upgrading older schemas to the current one
pub fn upgrade_record(record: Value) -> Result<MigrationResult, LibraryError> {
    let id = record_id(&record).unwrap_or_default();
    let version = record_version(&record);
    let corrupt = |e: serde_json::Error| LibraryError::Corrupt {
        id,
        reason: e.to_string(),
    };

    if !check_compatibility(version).can_load {
        return Err(LibraryError::UnsupportedVersion(version));
    }

    if version == SNAPSHOT_VERSION {
        let snapshot = serde_json::from_value(record).map_err(corrupt)?;
        return Ok(MigrationResult {
            snapshot,
            migrated: false,
            messages: Vec::new(),
        });
    }

    let mut messages = vec![format!("Migrating pattern {} from v1 to v{}", id, SNAPSHOT_VERSION)];
    let legacy: LegacySnapshotV1 = serde_json::from_value(record).map_err(corrupt)?;
    let flat_tracks = legacy
        .tracks
        .iter()
        .filter(|t| t.measures.is_none())
        .count();
    if flat_tracks > 0 {
        messages.push(format!(
            "Converted {} single-grid track(s) to measures",
            flat_tracks
        ));
    }

    Ok(MigrationResult {
        snapshot: legacy.into(),
        migrated: true,
        messages,
    })
}

/// Legacy pattern format (v1): no version field, optional settings, tracks
/// keyed by `key` with either `measures` or a flat `steps` array
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySnapshotV1 {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u64,
    pub name: Option<String>,
    pub bpm: Option<u32>,
    pub total_measures: Option<usize>,
    pub time_signature: Option<TimeSignature>,
    #[serde(default)]
    pub tracks: Vec<LegacyTrackV1>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTrackV1 {
    pub name: Option<String>,
    #[serde(alias = "instrumentId")]
    pub key: String,
    pub volume: Option<u8>,
    pub measures: Option<Vec<Vec<bool>>>,
    pub steps: Option<Vec<bool>>,
}

impl From<LegacyTrackV1> for TrackSnapshot {
    fn from(track: LegacyTrackV1) -> Self {
        let measures = match (track.measures, track.steps) {
            (Some(measures), _) => measures,
            (None, Some(steps)) => vec![steps],
            (None, None) => vec![vec![false; LEGACY_STEPS]],
        };
        Self {
            name: track.name.unwrap_or_else(|| track.key.clone()),
            instrument_id: track.key,
            // A zero volume meant "unset"
            volume: track.volume.filter(|&v| v > 0).unwrap_or(DEFAULT_VOLUME),
            measures,
        }
    }
}

impl From<LegacySnapshotV1> for PatternSnapshot {
    fn from(legacy: LegacySnapshotV1) -> Self {
        let name = legacy
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        // Legacy ids are creation times in milliseconds
        let date = legacy
            .date
            .or_else(|| i64::try_from(legacy.id).ok().and_then(DateTime::from_timestamp_millis))
            .unwrap_or(DateTime::UNIX_EPOCH);

        Self {
            version: SNAPSHOT_VERSION,
            id: legacy.id,
            name,
            bpm: legacy.bpm.unwrap_or(120),
            // Zero measures meant "unset" too
            total_measures: legacy.total_measures.filter(|&m| m > 0).unwrap_or(1),
            time_signature: legacy.time_signature.unwrap_or_default(),
            tracks: legacy.tracks.into_iter().map(TrackSnapshot::from).collect(),
            date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_record_passes_through() {
        let record = json!({
            "version": 2,
            "id": 5,
            "name": "Beat",
            "bpm": 100,
            "totalMeasures": 1,
            "timeSignature": "3/4",
            "tracks": [],
            "date": "2024-03-01T10:00:00Z"
        });
        let result = upgrade_record(record).unwrap();
        assert!(!result.migrated);
        assert_eq!(result.snapshot.time_signature, TimeSignature::ThreeFour);
    }

    #[test]
    fn test_flat_steps_become_one_measure() {
        let mut steps = vec![false; 32];
        steps[4] = true;
        let record = json!({
            "id": 1700000000000u64,
            "name": "Old groove",
            "bpm": 90,
            "tracks": [{ "name": "Kick", "key": "Kick 808", "steps": steps.clone() }]
        });

        let result = upgrade_record(record).unwrap();
        assert!(result.migrated);
        assert_eq!(result.messages.len(), 2);

        let snapshot = result.snapshot;
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.total_measures, 1);
        assert_eq!(snapshot.time_signature, TimeSignature::FourFour);
        assert_eq!(snapshot.tracks[0].volume, 4);
        assert_eq!(snapshot.tracks[0].measures, vec![steps]);
        assert_eq!(snapshot.date.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_legacy_defaults() {
        let record = json!({
            "id": 3,
            "name": "",
            "tracks": [{ "key": "Clap", "volume": 0 }]
        });
        let snapshot = upgrade_record(record).unwrap().snapshot;
        assert_eq!(snapshot.name, UNTITLED);
        assert_eq!(snapshot.bpm, 120);
        assert_eq!(snapshot.tracks[0].name, "Clap");
        assert_eq!(snapshot.tracks[0].volume, DEFAULT_VOLUME);
        assert_eq!(snapshot.tracks[0].measures, vec![vec![false; 32]]);
    }

    #[test]
    fn test_newer_version_rejected() {
        let record = json!({ "version": 3, "id": 1 });
        assert!(matches!(
            upgrade_record(record),
            Err(LibraryError::UnsupportedVersion(3))
        ));
        assert!(!check_compatibility(3).can_load);
        assert!(check_compatibility(1).needs_migration);
        assert_eq!(check_compatibility(2).warning, None);
    }

    #[test]
    fn test_malformed_record_is_corrupt() {
        let record = json!({ "id": 9, "tracks": "not a list" });
        match upgrade_record(record) {
            Err(LibraryError::Corrupt { id, .. }) => assert_eq!(id, 9),
            other => panic!("expected corrupt error, got {:?}", other),
        }
    }

    #[test]
    fn test_record_id_accepts_float() {
        assert_eq!(record_id(&json!({ "id": 12.0 })), Some(12));
        assert_eq!(record_id(&json!({ "id": 12.5 })), None);
        assert_eq!(record_id(&json!({ "id": "x" })), None);
        assert_eq!(record_id(&json!({})), None);
    }

    #[test]
    fn test_float_id_upgrades_like_integer() {
        let legacy = upgrade_record(json!({ "id": 12.0, "name": "Float" })).unwrap();
        assert!(legacy.migrated);
        assert_eq!(legacy.snapshot.id, 12);

        let current = upgrade_record(json!({
            "version": 2,
            "id": 12.0,
            "name": "Float",
            "bpm": 120,
            "totalMeasures": 1,
            "timeSignature": "4/4",
            "tracks": [],
            "date": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(current.snapshot.id, 12);
    }

    #[test]
    fn test_zero_measures_means_one() {
        let record = json!({
            "id": 4,
            "totalMeasures": 0,
            "tracks": [{ "key": "Kick 808", "measures": [vec![false; 32]] }]
        });
        let snapshot = upgrade_record(record).unwrap().snapshot;
        assert_eq!(snapshot.total_measures, 1);

        let pattern = snapshot.to_pattern().unwrap();
        assert_eq!(pattern.total_measures(), 1);
    }
}
