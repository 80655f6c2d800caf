//! Snapshot of all monitored modules at one fetch instant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Record;

/// Mapping from module name to its record list.
///
/// Serialized as a plain JSON object so the persisted file stays readable
/// and keys stay sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    modules: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record list of a module, replacing any previous list.
    pub fn insert(&mut self, module: impl Into<String>, records: Vec<Record>) {
        self.modules.insert(module.into(), records);
    }

    /// Records of a module. A missing module reads as an empty list.
    pub fn records(&self, module: &str) -> &[Record] {
        self.modules.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// True when no module was ever recorded.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn record_count(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, Vec<Record>)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Record>)>>(iter: I) -> Self {
        Self {
            modules: iter.into_iter().collect(),
        }
    }
}
