// Pattern library - Named pattern persistence over a key-value store
// Stored as one JSON array of snapshots, upgraded at load time

pub mod manager;
pub mod migration;
pub mod snapshot;
pub mod store;

pub use manager::{LIBRARY_KEY, PatternLibrary};
pub use migration::{CompatibilityInfo, MigrationResult, check_compatibility, upgrade_record};
pub use snapshot::{PatternSnapshot, SNAPSHOT_VERSION, TrackSnapshot, validate_snapshot};
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stored pattern {id} is corrupt: {reason}")]
    Corrupt { id: u64, reason: String },

    #[error("Pattern {0} not found")]
    NotFound(u64),

    #[error("Pattern validation failed: {0}")]
    Validation(String),

    #[error("Unsupported pattern format version {0}")]
    UnsupportedVersion(u32),
}
