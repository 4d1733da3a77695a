//! Workflow state and its durable storage.
//!
//! [`WorkflowState`] is the typed view of every stage input and output.
//! A [`StateStore`] persists it as a flat namespace of string keys, so the
//! same store can also hold session settings such as the API key.

mod file;
mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::core::StateKey;
use crate::errors::StateStoreError;

/// Store key holding the session API key. Not a workflow key, so reset
/// leaves it alone.
pub const API_KEY_SETTING: &str = "settings.api_key";

/// Values of the workflow, keyed by [`StateKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    values: BTreeMap<StateKey, String>,
}

impl WorkflowState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value, which may be empty.
    #[must_use]
    pub fn get(&self, key: StateKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Returns true if the key is present with a non-blank value.
    #[must_use]
    pub fn has(&self, key: StateKey) -> bool {
        self.get(key).is_some_and(|v| !v.trim().is_empty())
    }

    /// Sets a value, replacing any previous one.
    pub fn set(&mut self, key: StateKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    /// Sets a value, consuming and returning the state.
    #[must_use]
    pub fn with(mut self, key: StateKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Removes a value.
    pub fn remove(&mut self, key: StateKey) -> Option<String> {
        self.values.remove(&key)
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the stored values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (StateKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Returns the keys whose values differ from `other`, including keys
    /// present in only one of the two.
    #[must_use]
    pub fn changed_keys(&self, other: &Self) -> Vec<StateKey> {
        StateKey::ALL
            .into_iter()
            .filter(|key| self.get(*key) != other.get(*key))
            .collect()
    }

    /// Builds the typed state from raw store entries, ignoring unknown keys.
    #[must_use]
    pub fn from_entries(entries: &HashMap<String, String>) -> Self {
        let values = entries
            .iter()
            .filter_map(|(k, v)| k.parse::<StateKey>().ok().map(|key| (key, v.clone())))
            .collect();
        Self { values }
    }
}

/// Durable, session-scoped key/value persistence.
///
/// Batch operations are all-or-nothing: either every key is written or
/// removed, or the store is left as it was and an error is returned.
pub trait StateStore: Send + Sync + Debug {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StateStoreError>;

    /// Writes several values at once.
    fn set_many(&self, entries: &[(String, String)]) -> Result<(), StateStoreError>;

    /// Removes several keys at once. Missing keys are ignored.
    fn remove_many(&self, keys: &[String]) -> Result<(), StateStoreError>;

    /// Returns every stored entry.
    fn entries(&self) -> Result<HashMap<String, String>, StateStoreError>;

    /// Writes one value.
    fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        self.set_many(&[(key.to_string(), value.to_string())])
    }

    /// Removes one key.
    fn remove(&self, key: &str) -> Result<(), StateStoreError> {
        self.remove_many(&[key.to_string()])
    }

    /// Loads the workflow values.
    fn load_workflow(&self) -> Result<WorkflowState, StateStoreError> {
        Ok(WorkflowState::from_entries(&self.entries()?))
    }
}

/// Converts typed values into store entries.
pub(crate) fn to_entries<'a>(
    values: impl IntoIterator<Item = (StateKey, &'a str)>,
) -> Vec<(String, String)> {
    values
        .into_iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_string()))
        .collect()
}
