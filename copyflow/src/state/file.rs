//! JSON-file state store.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::StateStore;
use crate::errors::StateStoreError;

/// A store persisting every entry in one JSON object file.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so the file on disk is always a complete snapshot. The in-memory
/// copy is only replaced after the file has been written.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileStateStore {
    /// Opens the store at `path`, creating an empty one if the file does not
    /// exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateStoreError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StateStoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StateStoreError::io(&path, e)),
        };
        tracing::debug!(path = %path.display(), entries = data.len(), "Opened state file");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Returns the file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &HashMap<String, String>) -> Result<(), StateStoreError> {
        let encoded = serde_json::to_vec_pretty(data)
            .map_err(|e| StateStoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StateStoreError::io(parent, e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| StateStoreError::io(&tmp, e))?;
        file.write_all(&encoded)
            .and_then(|()| file.sync_all())
            .map_err(|e| StateStoreError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| StateStoreError::io(&self.path, e))
    }

    fn update<F>(&self, apply: F) -> Result<(), StateStoreError>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut guard = self.data.lock();
        let mut next = guard.clone();
        apply(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set_many(&self, entries: &[(String, String)]) -> Result<(), StateStoreError> {
        self.update(|data| {
            for (key, value) in entries {
                data.insert(key.clone(), value.clone());
            }
        })
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), StateStoreError> {
        self.update(|data| {
            for key in keys {
                data.remove(key);
            }
        })
    }

    fn entries(&self) -> Result<HashMap<String, String>, StateStoreError> {
        Ok(self.data.lock().clone())
    }
}
