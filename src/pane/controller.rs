//! Controller for one pane: a directory, its registry and its decode cache.
//!
//! All methods run on the UI thread. Scans happen on the pane's refresh
//! worker and come back through `apply_refresh`; moves arrive through
//! `receive_moved` and `remove_moved`. Every registry change is mirrored into
//! the viewport, the decode cache and the binding table in one place.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, trace};

use super::bindings::BindingTable;
use super::refresh::{RefreshResult, RefreshWorker};
use super::swipe::SwipeTracker;
use super::Side;
use crate::config::EngineConfig;
use crate::decode::{DecodeCache, DecodedImage, MediaDecoder, MemoryProbe, PrewarmQueue};
use crate::events::UiSender;
use crate::models::{Entry, Registry, RegistryEvent};
use crate::scanner::MetadataExtractor;
use crate::sync::Viewport;

pub struct PaneController {
    side: Side,
    label: String,
    directory: Option<PathBuf>,
    registry: Registry,
    cache: DecodeCache,
    prewarm: PrewarmQueue,
    viewport: Viewport,
    bindings: BindingTable,
    swipe: SwipeTracker,
    /// Entries sent to the other pane whose move has not finished yet.
    pending: HashSet<String>,
    extractor: MetadataExtractor,
    refresher: RefreshWorker,
    /// Shared with the other pane; set once the first layout pass is done.
    ready: Arc<AtomicBool>,
    /// Bumped whenever the directory changes.
    generation: u64,
    /// Bumped on every registry change made outside a refresh.
    mutations: u64,
    outstanding_refreshes: usize,
}

impl PaneController {
    pub fn new(
        side: Side,
        config: &EngineConfig,
        decoder: MediaDecoder,
        probe: Arc<dyn MemoryProbe>,
        ready: Arc<AtomicBool>,
        ui: UiSender,
    ) -> Result<Self> {
        let extractor = MetadataExtractor::default();
        let cache = DecodeCache::with_parts(config.cache.clone(), decoder, probe);
        let prewarm = PrewarmQueue::new(cache.clone(), side.name())?;
        let refresher = RefreshWorker::new(side, config.scan.clone(), extractor, ui)?;
        let default_width = config.cache.default_width as f32;

        Ok(Self {
            side,
            label: String::new(),
            directory: None,
            registry: Registry::new(),
            cache,
            prewarm,
            viewport: Viewport::new(default_width, default_width),
            bindings: BindingTable::new(),
            swipe: SwipeTracker::new(side.swipe_direction()),
            pending: HashSet::new(),
            extractor,
            refresher,
            ready,
            generation: 0,
            mutations: 0,
            outstanding_refreshes: 0,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Final component of the directory, for the pane's title.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn has_valid_directory(&self) -> bool {
        self.directory.as_deref().is_some_and(Path::is_dir)
    }

    /// Switches the pane to `dir`. Returns false if it is already showing it.
    pub fn set_directory(&mut self, dir: &Path) -> bool {
        if self.directory.as_deref() == Some(dir) {
            return false;
        }
        info!(side = self.side.name(), ?dir, "Pane directory changed");
        self.label = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        self.directory = Some(dir.to_path_buf());
        self.generation += 1;

        // Entries of the old directory mean nothing here.
        let stale: Vec<String> = self
            .registry
            .entries()
            .iter()
            .map(|e| e.file_name.clone())
            .collect();
        let events: Vec<RegistryEvent> = stale
            .iter()
            .filter_map(|name| self.registry.remove(name))
            .collect();
        self.apply_events(&events);
        self.pending.clear();
        self.prewarm.cancel_all();
        self.cache.set_base_dir(Some(dir));

        if self.ready.load(Ordering::Acquire) {
            self.refresh();
        }
        true
    }

    /// Queues a scan of the current directory on the pane's worker.
    ///
    /// Does nothing before the first layout pass or without a valid
    /// directory.
    pub fn refresh(&mut self) -> bool {
        if !self.ready.load(Ordering::Acquire) {
            trace!(side = self.side.name(), "Not ready, refresh deferred");
            return false;
        }
        let Some(dir) = self.directory.clone().filter(|d| d.is_dir()) else {
            return false;
        };
        if self.refresher.submit(dir, self.generation, self.mutations) {
            self.outstanding_refreshes += 1;
            true
        } else {
            false
        }
    }

    /// Applies a finished scan. Results for an older directory are dropped.
    pub fn apply_refresh(&mut self, result: RefreshResult) -> Vec<RegistryEvent> {
        self.outstanding_refreshes = self.outstanding_refreshes.saturating_sub(1);
        if result.generation != self.generation {
            debug!(
                side = self.side.name(),
                stale = result.generation,
                current = self.generation,
                "Dropping stale refresh"
            );
            return Vec::new();
        }

        let mut scanned = result.scan.entries;
        if result.mutations != self.mutations {
            // Moves landed while scanning; ask the disk about the names the
            // scan and the registry disagree on.
            let scanned_names: HashSet<String> =
                scanned.iter().map(|e| e.file_name.clone()).collect();
            scanned.retain(|e| {
                self.registry.contains(&e.file_name) || result.dir.join(&e.file_name).exists()
            });
            for entry in self.registry.entries() {
                if !scanned_names.contains(&entry.file_name)
                    && result.dir.join(&entry.file_name).exists()
                {
                    scanned.push(entry.clone());
                }
            }
        }

        let mut events = self.registry.reconcile(&scanned);
        events.extend(self.registry.load(scanned));
        self.apply_events(&events);
        debug!(
            side = self.side.name(),
            changes = events.len(),
            entries = self.registry.len(),
            "Applied refresh"
        );
        events
    }

    /// Adds a file that was just moved into this pane's directory and
    /// returns its entry.
    pub fn receive_moved(&mut self, path: &Path) -> Option<Entry> {
        let entry = self.extractor.entry_for(path)?;
        if let Some(existing) = self
            .registry
            .index_of(&entry.file_name)
            .and_then(|i| self.registry.get(i))
        {
            return Some(existing.clone());
        }
        if let Some(event) = self.registry.add(entry.clone()) {
            self.mutations += 1;
            self.apply_events(&[event]);
        }
        Some(entry)
    }

    /// Drops the entry of a file that was moved out of this pane.
    pub fn remove_moved(&mut self, file_name: &str) -> Option<Entry> {
        let event = self.registry.remove(file_name)?;
        self.mutations += 1;
        self.apply_events(std::slice::from_ref(&event));
        Some(event.entry().clone())
    }

    fn apply_events(&mut self, events: &[RegistryEvent]) {
        if events.is_empty() {
            return;
        }
        for event in events {
            match event {
                RegistryEvent::Added { index, entry } => {
                    self.viewport.insert_item(*index);
                    self.prewarm.suggest_cache(&entry.file_name);
                }
                RegistryEvent::Removed { index, entry } => {
                    self.viewport.remove_item(*index);
                    self.cache.suggest_remove_from_cache(&entry.file_name);
                    self.pending.remove(&entry.file_name);
                }
            }
        }
        self.bindings.invalidate();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn entries(&self) -> &[Entry] {
        self.registry.entries()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.registry.get(index)
    }

    pub fn index_of(&self, file_name: &str) -> Option<usize> {
        self.registry.index_of(file_name)
    }

    /// Full path of a tracked entry, for opening it in a viewer.
    pub fn path_of(&self, file_name: &str) -> Option<PathBuf> {
        if !self.registry.contains(file_name) {
            return None;
        }
        self.directory.as_ref().map(|dir| dir.join(file_name))
    }

    /// Decoded bitmap for the entry at `index`.
    pub fn image_at(&self, index: usize) -> Option<DecodedImage> {
        let entry = self.registry.get(index)?;
        self.cache.load(&entry.file_name)
    }

    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }

    pub fn prewarm(&self) -> &PrewarmQueue {
        &self.prewarm
    }

    /// Called by the display surface once it knows its size.
    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.cache.set_display_width(width);
        self.viewport.set_extent(height as f32, width as f32);
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// Entries alongside a mutable viewport, for driving this pane as a
    /// synchronization target.
    pub fn entries_and_viewport_mut(&mut self) -> (&[Entry], &mut Viewport) {
        (self.registry.entries(), &mut self.viewport)
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Binds display slot `slot` to `index` and returns the entry it shows.
    pub fn bind_slot(&mut self, slot: usize, index: usize) -> Option<&Entry> {
        let entry = self.registry.get(index)?;
        self.bindings.bind(slot, index);
        Some(entry)
    }

    pub fn entry_for_slot(&self, slot: usize) -> Option<&Entry> {
        self.bindings
            .index_for(slot)
            .and_then(|index| self.registry.get(index))
    }

    pub fn swipe_mut(&mut self) -> &mut SwipeTracker {
        &mut self.swipe
    }

    pub fn is_pending(&self, file_name: &str) -> bool {
        self.pending.contains(file_name)
    }

    pub(crate) fn mark_pending(&mut self, file_name: &str) -> bool {
        self.pending.insert(file_name.to_owned())
    }

    pub(crate) fn clear_pending(&mut self, file_name: &str) -> bool {
        self.pending.remove(file_name)
    }

    pub fn outstanding_refreshes(&self) -> usize {
        self.outstanding_refreshes
    }
}
