//! Time-ordered set of entries shown by one pane.
//!
//! Entries are kept newest first. Equal timestamps keep insertion order, so an
//! entry added after an equal-time sibling lands below it.

use std::collections::HashSet;

use tracing::trace;

use super::media_item::Entry;

/// Observable change to a registry, reported with the index it happened at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added { index: usize, entry: Entry },
    Removed { index: usize, entry: Entry },
}

impl RegistryEvent {
    pub fn entry(&self) -> &Entry {
        match self {
            Self::Added { entry, .. } | Self::Removed { entry, .. } => entry,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: Vec<Entry>,
    names: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.names.contains(file_name)
    }

    pub fn index_of(&self, file_name: &str) -> Option<usize> {
        if !self.contains(file_name) {
            return None;
        }
        self.entries.iter().position(|e| e.file_name == file_name)
    }

    /// Inserts `entry` at its sorted position.
    ///
    /// Returns `None` without touching the registry if an entry with the same
    /// file name is already tracked.
    pub fn add(&mut self, entry: Entry) -> Option<RegistryEvent> {
        if self.names.contains(&entry.file_name) {
            return None;
        }
        let index = self
            .entries
            .partition_point(|existing| existing.timestamp >= entry.timestamp);
        trace!(file_name = %entry.file_name, index, "Registry add");
        self.names.insert(entry.file_name.clone());
        self.entries.insert(index, entry.clone());
        Some(RegistryEvent::Added { index, entry })
    }

    pub fn remove(&mut self, file_name: &str) -> Option<RegistryEvent> {
        let index = self.index_of(file_name)?;
        let entry = self.entries.remove(index);
        self.names.remove(&entry.file_name);
        trace!(file_name = %entry.file_name, index, "Registry remove");
        Some(RegistryEvent::Removed { index, entry })
    }

    /// Drops every tracked entry whose file name is missing from `scanned`.
    ///
    /// Must run before [`Registry::load`] so indices reported by the load
    /// refer to the pruned list.
    pub fn reconcile(&mut self, scanned: &[Entry]) -> Vec<RegistryEvent> {
        let on_disk: HashSet<&str> = scanned.iter().map(|e| e.file_name.as_str()).collect();
        let mut events = Vec::new();
        // Back to front so reported indices stay valid as they are applied.
        for index in (0..self.entries.len()).rev() {
            if !on_disk.contains(self.entries[index].file_name.as_str()) {
                let entry = self.entries.remove(index);
                self.names.remove(&entry.file_name);
                events.push(RegistryEvent::Removed { index, entry });
            }
        }
        events
    }

    /// Adds every scanned entry that is not tracked yet.
    ///
    /// Entries already present are left untouched, even if their timestamp
    /// changed on disk.
    pub fn load(&mut self, scanned: Vec<Entry>) -> Vec<RegistryEvent> {
        scanned
            .into_iter()
            .filter_map(|entry| self.add(entry))
            .collect()
    }

    /// Checks the ordering and uniqueness invariants.
    pub fn is_consistent(&self) -> bool {
        let sorted = self
            .entries
            .windows(2)
            .all(|pair| pair[0].timestamp >= pair[1].timestamp);
        sorted && self.names.len() == self.entries.len()
    }
}
