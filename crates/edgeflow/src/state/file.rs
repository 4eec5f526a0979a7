use super::{StateMap, StateStore};
use crate::error::{EdgeflowError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// JSON-file state store: `<directory>/<component>.json`.
pub struct FileStateStore {
    directory: PathBuf,
    component: String,
}

impl FileStateStore {
    pub fn new(directory: impl Into<PathBuf>, component: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            component: component.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.json", self.component))
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(EdgeflowError::Io)?;
        }
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self) -> Result<Option<StateMap>> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EdgeflowError::Io(e)),
        };
        let state: StateMap = serde_json::from_str(&content).map_err(|e| {
            EdgeflowError::InvalidState(format!("{}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), keys = state.len(), "Loaded component state");
        Ok(Some(state))
    }

    fn set(&self, state: &StateMap) -> Result<()> {
        self.ensure_dir(&self.directory)?;

        // Sorted keys keep the file diffable.
        let sorted: BTreeMap<&String, &String> = state.iter().collect();
        let content = serde_json::to_string_pretty(&sorted).map_err(EdgeflowError::Serialization)?;

        // Atomic write
        let tmp_file = self
            .directory
            .join(format!(".{}-{}.tmp", self.component, Uuid::new_v4()));
        fs::write(&tmp_file, content).map_err(EdgeflowError::Io)?;
        fs::rename(&tmp_file, self.path()).map_err(EdgeflowError::Io)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EdgeflowError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_state_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path(), "list-file");
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn test_file_state_roundtrip_leaves_no_tmp_files() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state"), "tail-file");

        let mut state = StateMap::new();
        state.insert("file.0.name".to_string(), "app.log".to_string());
        state.insert("file.0.position".to_string(), "20".to_string());
        store.set(&state).unwrap();

        assert_eq!(store.get().unwrap(), Some(state));
        for entry in fs::read_dir(dir.path().join("state")).unwrap() {
            let name = entry.unwrap().file_name().into_string().unwrap();
            assert!(!name.ends_with(".tmp"), "Found leftover tmp file: {}", name);
        }
    }

    #[test]
    fn test_file_state_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path(), "list-file");
        store.set(&StateMap::new()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn test_file_state_corrupt_is_invalid_state() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path(), "list-file");
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(
            store.get().unwrap_err(),
            EdgeflowError::InvalidState(_)
        ));
    }
}
