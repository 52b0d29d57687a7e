//! In-memory cache of decoded bitmaps for one pane.
//!
//! - Keyed by file name relative to the pane's directory
//! - LRU with a byte budget; evicted entries are simply decoded again
//! - Halved under system memory pressure instead of waiting for the budget
//!
//! Clones share the same storage, so the pre-warm worker and the UI thread
//! see one cache.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::DynamicImage;
use lru::LruCache;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::loader::MediaDecoder;
use super::memory::{MemoryProbe, SystemMemoryProbe};
use crate::config::CacheConfig;

/// Estimated bytes per pixel for RGBA bitmaps.
const BYTES_PER_PIXEL: usize = 4;

/// Entry cap independent of the byte budget.
const DEFAULT_LRU_CAPACITY: usize = 2048;

const FIRST_WIDTH_RETRY: Duration = Duration::from_millis(1);

/// A decoded bitmap shared between the cache and its readers.
pub type DecodedImage = Arc<DynamicImage>;

#[derive(Clone)]
struct CachedImage {
    /// `None` records a failed decode so it is not retried on every draw.
    image: Option<DecodedImage>,
    memory_bytes: usize,
}

impl CachedImage {
    fn new(image: Option<DecodedImage>) -> Self {
        let memory_bytes = image
            .as_ref()
            .map(|img| img.width() as usize * img.height() as usize * BYTES_PER_PIXEL)
            .unwrap_or(0);
        Self {
            image,
            memory_bytes,
        }
    }
}

pub struct DecodeCache {
    config: CacheConfig,
    max_memory_bytes: usize,
    base_dir: Arc<RwLock<Option<PathBuf>>>,
    /// Width of the display surface; zero until it has been measured.
    display_width: Arc<AtomicU32>,
    current_memory_bytes: Arc<RwLock<usize>>,
    memory_cache: Arc<RwLock<LruCache<String, CachedImage>>>,
    decoder: MediaDecoder,
    probe: Arc<dyn MemoryProbe>,
}

impl DecodeCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_parts(config, MediaDecoder::new(), Arc::new(SystemMemoryProbe::new()))
    }

    pub fn with_parts(config: CacheConfig, decoder: MediaDecoder, probe: Arc<dyn MemoryProbe>) -> Self {
        let max_memory_bytes = config.max_memory_bytes();
        debug!(max_memory_bytes, "Initialized decode cache");
        Self {
            config,
            max_memory_bytes,
            base_dir: Arc::new(RwLock::new(None)),
            display_width: Arc::new(AtomicU32::new(0)),
            current_memory_bytes: Arc::new(RwLock::new(0)),
            memory_cache: Arc::new(RwLock::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ))),
            decoder,
            probe,
        }
    }

    /// Points the cache at a new directory. Cached names from the old one
    /// are meaningless there, so everything is dropped.
    pub fn set_base_dir(&self, dir: Option<&Path>) {
        *self.base_dir.write() = dir.map(Path::to_path_buf);
        self.clear();
    }

    pub fn base_dir(&self) -> Option<PathBuf> {
        self.base_dir.read().clone()
    }

    pub fn set_display_width(&self, width: u32) {
        self.display_width.store(width, Ordering::Release);
    }

    /// Width to decode against. Waits for the display to be measured with a
    /// doubling backoff, then falls back to the configured default.
    pub fn target_width(&self) -> u32 {
        let mut waited = Duration::ZERO;
        let mut step = FIRST_WIDTH_RETRY;
        loop {
            let width = self.display_width.load(Ordering::Acquire);
            if width > 0 {
                return width;
            }
            if waited + step > self.config.width_wait_budget {
                break;
            }
            thread::sleep(step);
            waited += step;
            step *= 2;
        }
        warn!(
            default_width = self.config.default_width,
            "Display width never reported, using default"
        );
        self.config.default_width
    }

    /// Returns the decoded bitmap for `file_name`, decoding it synchronously
    /// on a miss. Failed decodes yield `None`.
    pub fn load(&self, file_name: &str) -> Option<DecodedImage> {
        if let Some(cached) = self.memory_cache.write().get(file_name) {
            trace!(file_name, "Decode cache hit");
            return cached.image.clone();
        }

        let Some(dir) = self.base_dir() else {
            debug!(file_name, "No directory set, cannot decode");
            return None;
        };
        let path = dir.join(file_name);
        let image = match self.decoder.decode(&path, self.target_width()) {
            Ok(img) => Some(Arc::new(img)),
            Err(e) => {
                warn!(?path, error = %e, "Failed to decode media");
                None
            }
        };

        // The directory may have changed while decoding.
        if self.base_dir.read().as_deref() == Some(dir.as_path()) {
            self.insert(file_name.to_owned(), CachedImage::new(image.clone()));
        }
        image
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.memory_cache.read().contains(file_name)
    }

    /// Drops the entry for a file that left the pane.
    pub fn suggest_remove_from_cache(&self, file_name: &str) -> bool {
        let removed = self.memory_cache.write().pop(file_name);
        match removed {
            Some(evicted) => {
                let mut current = self.current_memory_bytes.write();
                *current = current.saturating_sub(evicted.memory_bytes);
                trace!(file_name, "Removed from decode cache");
                true
            }
            None => false,
        }
    }

    /// Whether a background pre-warm may decode right now.
    pub fn can_prewarm(&self) -> bool {
        if self.probe.is_low_memory() {
            debug!("System reports low memory, skipping pre-warm");
            self.trim_under_pressure();
            return false;
        }
        let floor = self.config.min_free_heap_mb * 1024 * 1024;
        if self.free_bytes() < floor {
            debug!(free_bytes = self.free_bytes(), "Decode budget nearly exhausted, skipping pre-warm");
            return false;
        }
        true
    }

    /// Releases the least recently used half of the cache.
    pub fn trim_under_pressure(&self) {
        let mut cache = self.memory_cache.write();
        let target = cache.len() / 2;
        let mut current = self.current_memory_bytes.write();
        while cache.len() > target {
            match cache.pop_lru() {
                Some((_, evicted)) => *current = current.saturating_sub(evicted.memory_bytes),
                None => break,
            }
        }
        debug!(remaining = cache.len(), "Trimmed decode cache under memory pressure");
    }

    fn insert(&self, file_name: String, cached: CachedImage) {
        let new_size = cached.memory_bytes;
        self.evict_if_needed(new_size);

        let mut cache = self.memory_cache.write();
        let mut current = self.current_memory_bytes.write();
        // Either the replaced value or the entry evicted by the count cap.
        if let Some((_, old)) = cache.push(file_name, cached) {
            *current = current.saturating_sub(old.memory_bytes);
        }
        *current += new_size;
    }

    fn evict_if_needed(&self, needed_bytes: usize) {
        let mut cache = self.memory_cache.write();
        let mut current = self.current_memory_bytes.write();
        while *current + needed_bytes > self.max_memory_bytes {
            match cache.pop_lru() {
                Some((name, evicted)) => {
                    *current = current.saturating_sub(evicted.memory_bytes);
                    trace!(file_name = %name, current_bytes = *current, "Evicted from decode cache");
                }
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        self.memory_cache.write().clear();
        *self.current_memory_bytes.write() = 0;
    }

    pub fn memory_usage(&self) -> usize {
        *self.current_memory_bytes.read()
    }

    pub fn free_bytes(&self) -> usize {
        self.max_memory_bytes.saturating_sub(self.memory_usage())
    }

    pub fn len(&self) -> usize {
        self.memory_cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for DecodeCache {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            max_memory_bytes: self.max_memory_bytes,
            base_dir: Arc::clone(&self.base_dir),
            display_width: Arc::clone(&self.display_width),
            current_memory_bytes: Arc::clone(&self.current_memory_bytes),
            memory_cache: Arc::clone(&self.memory_cache),
            decoder: self.decoder.clone(),
            probe: Arc::clone(&self.probe),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::memory::FixedMemoryProbe;
    use image::RgbImage;
    use std::fs;
    use tempfile::tempdir;

    fn test_config() -> CacheConfig {
        CacheConfig {
            width_wait_budget: Duration::from_millis(8),
            ..Default::default()
        }
    }

    fn cache_in(dir: &Path, low_memory: bool) -> DecodeCache {
        let cache = DecodeCache::with_parts(
            test_config(),
            MediaDecoder::new(),
            Arc::new(FixedMemoryProbe(low_memory)),
        );
        cache.set_base_dir(Some(dir));
        cache.set_display_width(64);
        cache
    }

    #[test]
    fn test_load_caches_decoded_image() {
        let dir = tempdir().unwrap();
        RgbImage::new(32, 16).save(dir.path().join("a.png")).unwrap();
        let cache = cache_in(dir.path(), false);

        let first = cache.load("a.png").unwrap();
        assert!(cache.contains("a.png"));
        assert_eq!(cache.memory_usage(), 32 * 16 * BYTES_PER_PIXEL);

        let second = cache.load("a.png").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_load_after_remove_redecodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        RgbImage::new(8, 8).save(&path).unwrap();
        let cache = cache_in(dir.path(), false);

        let first = cache.load("a.png").unwrap();
        assert!(cache.suggest_remove_from_cache("a.png"));
        assert!(!cache.contains("a.png"));
        assert_eq!(cache.memory_usage(), 0);

        // A different file under the same name must be picked up.
        RgbImage::new(12, 6).save(&path).unwrap();
        let second = cache.load("a.png").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.width(), 12);
    }

    #[test]
    fn test_decode_failure_is_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.jpg"), b"nope").unwrap();
        let cache = cache_in(dir.path(), false);

        assert!(cache.load("bad.jpg").is_none());
        assert!(cache.load("missing.png").is_none());
    }

    #[test]
    fn test_target_width_falls_back_to_default() {
        let cache = DecodeCache::with_parts(
            test_config(),
            MediaDecoder::new(),
            Arc::new(FixedMemoryProbe(false)),
        );
        assert_eq!(cache.target_width(), 512);

        cache.set_display_width(300);
        assert_eq!(cache.target_width(), 300);
    }

    #[test]
    fn test_target_width_picks_up_late_measurement() {
        let cache = DecodeCache::with_parts(
            CacheConfig {
                width_wait_budget: Duration::from_secs(5),
                ..Default::default()
            },
            MediaDecoder::new(),
            Arc::new(FixedMemoryProbe(false)),
        );
        let display = cache.clone();
        let measure = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            display.set_display_width(300);
        });

        assert_eq!(cache.target_width(), 300);
        measure.join().unwrap();
    }

    #[test]
    fn test_prewarm_gated_by_memory() {
        let dir = tempdir().unwrap();
        assert!(cache_in(dir.path(), false).can_prewarm());
        assert!(!cache_in(dir.path(), true).can_prewarm());
    }

    #[test]
    fn test_prewarm_gated_by_free_budget() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), false);
        let nearly_full = cache.max_memory_bytes - 1024;
        cache.insert(
            "huge".into(),
            CachedImage {
                image: None,
                memory_bytes: nearly_full,
            },
        );
        assert!(!cache.can_prewarm());
    }

    #[test]
    fn test_trim_under_pressure_halves() {
        let dir = tempdir().unwrap();
        for i in 0..4 {
            RgbImage::new(4, 4).save(dir.path().join(format!("{i}.png"))).unwrap();
        }
        let cache = cache_in(dir.path(), false);
        for i in 0..4 {
            cache.load(&format!("{i}.png"));
        }
        cache.trim_under_pressure();
        assert_eq!(cache.len(), 2);
        // Most recently used survive.
        assert!(cache.contains("3.png"));
        assert!(!cache.contains("0.png"));
    }

    #[test]
    fn test_set_base_dir_clears() {
        let dir = tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
        let cache = cache_in(dir.path(), false);
        cache.load("a.png");

        let clone = cache.clone();
        clone.set_base_dir(None);
        assert!(cache.is_empty());
        assert!(cache.load("a.png").is_none());
    }
}
