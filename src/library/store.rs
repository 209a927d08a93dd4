// Key-value storage backends for the pattern library

use crate::library::LibraryError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Opaque string store, the only thing the library needs from its host
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LibraryError>;
    fn set(&self, key: &str, value: &str) -> Result<(), LibraryError>;
    fn remove(&self, key: &str) -> Result<(), LibraryError>;
}

/// In-memory store, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, LibraryError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LibraryError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, LibraryError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        // Readers only ever see a complete file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LibraryError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("groove_library").unwrap(), None);
        store.set("groove_library", "[]").unwrap();
        assert_eq!(store.get("groove_library").unwrap().as_deref(), Some("[]"));
        store.set("groove_library", "[1]").unwrap();
        assert_eq!(store.get("groove_library").unwrap().as_deref(), Some("[1]"));
        store.remove("groove_library").unwrap();
        assert_eq!(store.get("groove_library").unwrap(), None);
        store.remove("groove_library").unwrap();
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("library"));
        exercise(&store);
    }

    #[test]
    fn test_file_store_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("library");
        let store = FileStore::new(&root);
        store.set("groove_library", "[]").unwrap();
        assert!(root.join("groove_library.json").exists());
        assert!(!root.join("groove_library.json.tmp").exists());
    }
}
