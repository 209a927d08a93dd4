// Integration test for the pattern library on disk
// Saves, reopens, upgrades and loads patterns through a file-backed store

use groovestation::library::{FileStore, LIBRARY_KEY, SNAPSHOT_VERSION};
use groovestation::render::{CaptureSink, CaptureVisual};
use groovestation::sequencer::{Drive, SampleClock};
use groovestation::{
    DrumMachine, EngineConfig, LibraryError, PatternLibrary, PatternStore, SourceRouter,
    TimeSignature, TransportClock,
};
use serde_json::json;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

fn machine(root: &Path) -> DrumMachine {
    let (machine, _notifications) = DrumMachine::with_drive(
        &EngineConfig::default(),
        Drive::Manual,
        TransportClock::new(SampleClock::with_sample_rate(48000.0)),
        SourceRouter::new(Rc::new(CaptureSink::new())),
        Rc::new(CaptureVisual::new()),
        PatternLibrary::new(FileStore::new(root)),
    )
    .unwrap();
    machine
}

fn library_file(root: &Path) -> std::path::PathBuf {
    root.join(format!("{LIBRARY_KEY}.json"))
}

#[test]
fn test_saved_pattern_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let mut store = PatternStore::default();
    store.set_time_signature(TimeSignature::ThreeFour);
    store.set_bpm(96).unwrap();
    store.add_measure().unwrap();
    store.toggle_step(0, 0, 0).unwrap();
    store.toggle_step(1, 1, 12).unwrap();
    store.set_volume(2, 1).unwrap();

    let id = PatternLibrary::new(FileStore::new(dir.path()))
        .save("Waltz", store.pattern())
        .unwrap();

    // A fresh library over the same directory sees the save
    let reopened = PatternLibrary::new(FileStore::new(dir.path()));
    let snapshots = reopened.list().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].id, id);
    assert_eq!(snapshots[0].name, "Waltz");
    assert_eq!(snapshots[0].version, SNAPSHOT_VERSION);
    assert_eq!(&snapshots[0].to_pattern().unwrap(), store.pattern());

    let raw = std::fs::read_to_string(library_file(dir.path())).unwrap();
    assert!(raw.contains("\"timeSignature\":\"3/4\""));
    assert!(raw.contains("\"instrumentId\":\"Kick 808\""));
}

#[test]
fn test_legacy_library_loads_into_machine() {
    let dir = TempDir::new().unwrap();
    let mut kick = vec![false; 32];
    kick[0] = true;
    kick[16] = true;
    let legacy = json!([
        {
            "id": 1_650_000_000_000u64,
            "name": "From the old app",
            "bpm": 100,
            "tracks": [
                { "name": "Kick", "key": "Kick 808", "volume": 5, "steps": kick },
                { "key": "Clap" }
            ]
        }
    ]);
    std::fs::write(library_file(dir.path()), legacy.to_string()).unwrap();

    let machine = machine(dir.path());
    let listed = machine.list_patterns().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].version, SNAPSHOT_VERSION);

    machine.load_pattern(1_650_000_000_000).unwrap();
    let store = machine.store();
    assert_eq!(store.tempo().bpm(), 100);
    assert_eq!(store.time_signature(), TimeSignature::FourFour);
    assert_eq!(store.total_measures(), 1);
    assert_eq!(store.tracks().len(), 2);

    let kick = &store.tracks()[0];
    assert_eq!(kick.instrument_id, "Kick 808");
    assert_eq!(kick.volume(), 5);
    assert!(kick.is_active(0, 0));
    assert!(kick.is_active(0, 16));
    assert!(!kick.is_active(0, 8));

    let clap = &store.tracks()[1];
    assert_eq!(clap.name, "Clap");
    assert!(clap.measures()[0].active_steps().next().is_none());
}

#[test]
fn test_corrupt_entry_does_not_hide_others() {
    let dir = TempDir::new().unwrap();
    let library = PatternLibrary::new(FileStore::new(dir.path()));
    let good = library.save("Good", PatternStore::default().pattern()).unwrap();

    let path = library_file(dir.path());
    let mut records: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    records.push(json!({ "version": 2, "id": 9, "name": "Broken", "bpm": "fast" }));
    std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

    let listed = library.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, good);
    assert_eq!(library.len().unwrap(), 2);
    assert!(matches!(
        library.load(9),
        Err(LibraryError::Corrupt { id: 9, .. })
    ));

    // Deleting the broken entry leaves the good one alone
    library.delete(9).unwrap();
    assert_eq!(library.len().unwrap(), 1);
    assert_eq!(library.load(good).unwrap().name, "Good");
}

#[test]
fn test_unreadable_library_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(library_file(dir.path()), "not json").unwrap();

    let library = PatternLibrary::new(FileStore::new(dir.path()));
    assert!(matches!(library.list(), Err(LibraryError::Json(_))));
}

#[test]
fn test_missing_library_is_empty() {
    let dir = TempDir::new().unwrap();
    let library = PatternLibrary::new(FileStore::new(dir.path().join("never-created")));
    assert!(library.is_empty().unwrap());
    assert!(matches!(library.load(1), Err(LibraryError::NotFound(1))));
}
