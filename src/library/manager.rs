// Pattern library manager - save, list, load and delete named patterns

use crate::library::migration::{record_id, upgrade_record};
use crate::library::snapshot::PatternSnapshot;
use crate::library::store::KeyValueStore;
use crate::library::LibraryError;
use crate::sequencer::Pattern;
use chrono::Utc;
use serde_json::Value;

/// Store key holding the library array
pub const LIBRARY_KEY: &str = "groove_library";

/// Pattern library - keeps every saved snapshot in one JSON array
///
/// Entries are parsed one by one, so a damaged entry only affects itself.
pub struct PatternLibrary {
    store: Box<dyn KeyValueStore>,
}

impl PatternLibrary {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Save `pattern` under `name` and return the new id
    ///
    /// Ids are creation times in milliseconds, bumped past the newest
    /// existing id so two saves in the same millisecond stay distinct.
    pub fn save(&self, name: &str, pattern: &Pattern) -> Result<u64, LibraryError> {
        let mut records = self.read_records()?;
        let now = Utc::now();
        let newest = records.iter().filter_map(record_id).max();
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        let id = match newest {
            Some(newest) if newest >= millis => newest + 1,
            _ => millis,
        };

        let snapshot = PatternSnapshot::capture(id, name, pattern, now);
        records.push(serde_json::to_value(&snapshot)?);
        self.write_records(&records)?;

        tracing::info!(id, name = %snapshot.name, "Pattern saved");
        Ok(id)
    }

    /// Every readable snapshot in save order
    ///
    /// Entries that fail to parse are skipped and logged.
    pub fn list(&self) -> Result<Vec<PatternSnapshot>, LibraryError> {
        let snapshots = self
            .read_records()?
            .into_iter()
            .filter_map(|record| match upgrade_record(record) {
                Ok(result) => Some(result.snapshot),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable library entry");
                    None
                }
            })
            .collect();
        Ok(snapshots)
    }

    /// Load the snapshot saved under `id`
    pub fn load(&self, id: u64) -> Result<PatternSnapshot, LibraryError> {
        let record = self
            .read_records()?
            .into_iter()
            .find(|record| record_id(record) == Some(id))
            .ok_or(LibraryError::NotFound(id))?;

        let result = upgrade_record(record)?;
        for message in &result.messages {
            tracing::debug!(id, "{}", message);
        }
        Ok(result.snapshot)
    }

    /// Delete the snapshot saved under `id`
    pub fn delete(&self, id: u64) -> Result<(), LibraryError> {
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|record| record_id(record) != Some(id));
        if records.len() == before {
            return Err(LibraryError::NotFound(id));
        }

        self.write_records(&records)?;
        tracing::info!(id, "Pattern deleted");
        Ok(())
    }

    /// Number of stored entries, readable or not
    pub fn len(&self) -> Result<usize, LibraryError> {
        Ok(self.read_records()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LibraryError> {
        Ok(self.len()? == 0)
    }

    fn read_records(&self) -> Result<Vec<Value>, LibraryError> {
        match self.store.get(LIBRARY_KEY)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    fn write_records(&self, records: &[Value]) -> Result<(), LibraryError> {
        let raw = serde_json::to_string(records)?;
        self.store.set(LIBRARY_KEY, &raw)
    }
}

impl std::fmt::Debug for PatternLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternLibrary").finish_non_exhaustive()
    }
}
