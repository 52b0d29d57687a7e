//! Background pre-warming of a pane's decode cache.
//!
//! - One worker thread per pane, at reduced scheduling priority
//! - Requests are deduplicated while pending
//! - Every request re-checks memory pressure before decoding
//!
//! Interactive `DecodeCache::load` calls never wait on this queue; a race
//! between the two at worst decodes the same file twice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use flume::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::cache::DecodeCache;

/// Niceness increment applied to the worker thread.
#[cfg(unix)]
const PREWARM_NICENESS: libc::c_int = 10;

pub struct PrewarmQueue {
    request_tx: Option<Sender<String>>,
    worker: Option<JoinHandle<()>>,
    busy: Arc<AtomicBool>,
    pending: Arc<RwLock<HashSet<String>>>,
    cache: DecodeCache,
}

impl PrewarmQueue {
    pub fn new(cache: DecodeCache, name: &str) -> Result<Self> {
        let (request_tx, request_rx) = flume::unbounded();
        let busy = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(RwLock::new(HashSet::new()));

        let worker = {
            let busy = Arc::clone(&busy);
            let pending = Arc::clone(&pending);
            let cache = cache.clone();
            thread::Builder::new()
                .name(format!("prewarm-{name}"))
                .spawn(move || worker_loop(request_rx, busy, pending, cache))
                .context("Failed to spawn pre-warm worker")?
        };

        Ok(Self {
            request_tx: Some(request_tx),
            worker: Some(worker),
            busy,
            pending,
            cache,
        })
    }

    /// Asks the worker to decode `file_name` ahead of display. Returns false
    /// if it is already cached or queued.
    pub fn suggest_cache(&self, file_name: &str) -> bool {
        if self.cache.contains(file_name) {
            return false;
        }
        if !self.pending.write().insert(file_name.to_owned()) {
            trace!(file_name, "Pre-warm already pending");
            return false;
        }
        match &self.request_tx {
            Some(tx) if tx.send(file_name.to_owned()).is_ok() => true,
            _ => {
                self.pending.write().remove(file_name);
                false
            }
        }
    }

    /// Forgets queued requests; the worker skips them when it gets to them.
    pub fn cancel_all(&self) {
        self.pending.write().clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire) || !self.pending.read().is_empty()
    }

    /// Blocks until the queue drains or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.is_busy() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }
}

impl Drop for PrewarmQueue {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.request_tx.take();
        self.pending.write().clear();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        debug!("Pre-warm queue shut down");
    }
}

fn worker_loop(
    rx: Receiver<String>,
    busy: Arc<AtomicBool>,
    pending: Arc<RwLock<HashSet<String>>>,
    cache: DecodeCache,
) {
    lower_priority();
    while let Ok(file_name) = rx.recv() {
        if !pending.read().contains(&file_name) {
            continue;
        }
        busy.store(true, Ordering::Release);
        if cache.can_prewarm() && !cache.contains(&file_name) {
            trace!(file_name, "Pre-warming");
            let _ = cache.load(&file_name);
        }
        pending.write().remove(&file_name);
        busy.store(false, Ordering::Release);
    }
}

#[cfg(unix)]
fn lower_priority() {
    // SAFETY: nice only adjusts the calling thread's scheduling priority on
    // Linux and has no memory-safety preconditions.
    let result = unsafe { libc::nice(PREWARM_NICENESS) };
    if result == -1 {
        debug!("Could not lower pre-warm worker priority");
    }
}

#[cfg(not(unix))]
fn lower_priority() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::decode::loader::MediaDecoder;
    use crate::decode::memory::FixedMemoryProbe;
    use image::RgbImage;
    use tempfile::tempdir;

    fn cache_for(dir: &std::path::Path, low_memory: bool) -> DecodeCache {
        let cache = DecodeCache::with_parts(
            CacheConfig::default(),
            MediaDecoder::new(),
            Arc::new(FixedMemoryProbe(low_memory)),
        );
        cache.set_base_dir(Some(dir));
        cache.set_display_width(64);
        cache
    }

    #[test]
    fn test_suggest_cache_warms() {
        let dir = tempdir().unwrap();
        RgbImage::new(8, 8).save(dir.path().join("a.png")).unwrap();
        let cache = cache_for(dir.path(), false);
        let queue = PrewarmQueue::new(cache.clone(), "test").unwrap();

        assert!(queue.suggest_cache("a.png"));
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert!(cache.contains("a.png"));
        // Already cached.
        assert!(!queue.suggest_cache("a.png"));
    }

    #[test]
    fn test_low_memory_skips_decode() {
        let dir = tempdir().unwrap();
        RgbImage::new(8, 8).save(dir.path().join("a.png")).unwrap();
        let cache = cache_for(dir.path(), true);
        let queue = PrewarmQueue::new(cache.clone(), "test").unwrap();

        assert!(queue.suggest_cache("a.png"));
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert!(!cache.contains("a.png"));
        // An interactive load still decodes.
        assert!(cache.load("a.png").is_some());
    }

    #[test]
    fn test_drop_joins_worker() {
        let dir = tempdir().unwrap();
        let queue = PrewarmQueue::new(cache_for(dir.path(), false), "test").unwrap();
        queue.suggest_cache("missing.png");
        drop(queue);
    }
}
