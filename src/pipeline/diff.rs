//! Diff calculation between two snapshots.
//!
//! Computes, per module, the records that were added, removed, or changed
//! between the persisted snapshot and a fresh one.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::models::{IdentityPolicy, ModuleConfig, Record, Snapshot};

/// Two versions of the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub old: Record,
    pub new: Record,
}

/// Changes within one module.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ModuleDiff {
    /// Logical module name
    pub module: String,
    /// Display label for reports
    pub label: Option<String>,
    /// In new, not in old; sorted by identity key
    pub added: Vec<Record>,
    /// In old, not in new; sorted by identity key
    pub removed: Vec<Record>,
    /// Same identity, different title or date; in new order
    pub changed: Vec<Change>,
}

impl ModuleDiff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }

    /// Label for display, falling back to the module name.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.module)
    }
}

/// Changes across all compared modules, in comparison order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SnapshotDiff {
    pub modules: Vec<ModuleDiff>,
}

impl SnapshotDiff {
    /// Check if any module changed.
    pub fn has_changes(&self) -> bool {
        self.modules.iter().any(ModuleDiff::has_changes)
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.modules.iter().map(ModuleDiff::change_count).sum()
    }

    pub fn module(&self, name: &str) -> Option<&ModuleDiff> {
        self.modules.iter().find(|m| m.module == name)
    }
}

/// Calculator for computing diffs between record lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffCalculator {
    identity: IdentityPolicy,
}

impl DiffCalculator {
    /// Create a diff calculator using the given identity key.
    pub fn new(identity: IdentityPolicy) -> Self {
        Self { identity }
    }

    /// Calculate the diff between previous and current record lists.
    pub fn calculate(&self, module: &str, previous: &[Record], current: &[Record]) -> ModuleDiff {
        let prev_map: HashMap<String, &Record> = previous
            .iter()
            .map(|r| (r.identity_key(self.identity).into_owned(), r))
            .collect();

        let curr_map: HashMap<String, &Record> = current
            .iter()
            .map(|r| (r.identity_key(self.identity).into_owned(), r))
            .collect();

        let prev_keys: BTreeSet<&str> = prev_map.keys().map(String::as_str).collect();
        let curr_keys: BTreeSet<&str> = curr_map.keys().map(String::as_str).collect();

        // Added: in current but not in previous
        let added = curr_keys
            .difference(&prev_keys)
            .filter_map(|key| curr_map.get(*key).map(|r| (*r).clone()))
            .collect();

        // Removed: in previous but not in current
        let removed = prev_keys
            .difference(&curr_keys)
            .filter_map(|key| prev_map.get(*key).map(|r| (*r).clone()))
            .collect();

        // Changed: in both but title or date differs
        let changed = current
            .iter()
            .filter_map(|curr| {
                let key = curr.identity_key(self.identity);
                let prev = prev_map.get(&*key)?;
                prev.content_differs(curr).then(|| Change {
                    old: (*prev).clone(),
                    new: curr.clone(),
                })
            })
            .collect();

        ModuleDiff {
            module: module.to_string(),
            label: None,
            added,
            removed,
            changed,
        }
    }
}

/// Diff every configured module, in configuration order.
///
/// A module missing from either snapshot compares as an empty list.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot, modules: &[ModuleConfig]) -> SnapshotDiff {
    SnapshotDiff {
        modules: modules
            .iter()
            .map(|module| {
                let mut diff = DiffCalculator::new(module.identity).calculate(
                    &module.name,
                    old.records(&module.name),
                    new.records(&module.name),
                );
                diff.label = module.label.clone();
                diff
            })
            .collect(),
    }
}

/// Union of module names present in either snapshot, sorted.
pub fn module_names<'a>(old: &'a Snapshot, new: &'a Snapshot) -> Vec<&'a str> {
    old.module_names()
        .chain(new.module_names())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
