//! Mapping from recycled display slots to registry indices.
//!
//! A display surface reuses a handful of item views while scrolling. It binds
//! each slot to the index it currently shows and asks the table which entry a
//! touched slot belongs to. Any registry change shifts indices, so the whole
//! table is invalidated and the surface rebinds.

#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    slots: Vec<Option<usize>>,
    epoch: u64,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, slot: usize, index: usize) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(index);
    }

    pub fn unbind(&mut self, slot: usize) {
        if let Some(binding) = self.slots.get_mut(slot) {
            *binding = None;
        }
    }

    pub fn index_for(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot).copied().flatten()
    }

    pub fn slot_for(&self, index: usize) -> Option<usize> {
        self.slots.iter().position(|&bound| bound == Some(index))
    }

    /// Drops every binding. The epoch lets a surface notice it must rebind.
    pub fn invalidate(&mut self) {
        self.slots.clear();
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
