//! Tunables for scanning, decoding and scroll synchronization.

use std::time::Duration;

/// Configuration for the directory scanner.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Number of threads used for timestamp extraction.
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
        }
    }
}

/// Default memory budget for decoded images in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: usize = 192;

/// Minimum memory budget in megabytes.
pub const MIN_MEMORY_MB: usize = 64;

/// Maximum memory budget in megabytes.
pub const MAX_MEMORY_MB: usize = 512;

/// Configuration for a pane's decode cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory budget for decoded images, clamped to `MIN_MEMORY_MB..=MAX_MEMORY_MB`.
    pub max_memory_mb: usize,
    /// Pre-warming is skipped once less than this much budget is left.
    pub min_free_heap_mb: usize,
    /// Width used when the display never reports one.
    pub default_width: u32,
    /// Total time spent waiting for the display to report its width.
    pub width_wait_budget: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            min_free_heap_mb: 10,
            default_width: 512,
            width_wait_budget: Duration::from_millis(4096),
        }
    }
}

impl CacheConfig {
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB) * 1024 * 1024
    }
}

/// Configuration shared by both scroll synchronizers.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fraction of the scrolled pane's viewport ignored at the top and bottom
    /// when computing its focus window.
    pub source_focus_margin: f32,
    /// Same margin for the pane being synchronized.
    pub target_focus_margin: f32,
    /// Duration of a programmatic smooth scroll.
    pub scroll_duration: Duration,
    /// Time a suppression window stays open after its scroll finished.
    pub grace_period: Duration,
    /// Targets within this many visible spans are animated to directly;
    /// farther ones are jumped near first.
    pub near_span_multiple: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_focus_margin: 0.35,
            target_focus_margin: 0.4,
            scroll_duration: Duration::from_millis(8000),
            grace_period: Duration::from_millis(250),
            near_span_multiple: 3,
        }
    }
}

impl SyncConfig {
    /// Longest time a suppression window can stay open.
    pub fn suppression_budget(&self) -> Duration {
        self.scroll_duration + self.grace_period
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
}

impl EngineConfig {
    pub fn with_scan(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_limit_clamping() {
        let mut config = CacheConfig {
            max_memory_mb: 10,
            ..Default::default()
        };
        assert_eq!(config.max_memory_bytes(), MIN_MEMORY_MB * 1024 * 1024);

        config.max_memory_mb = 1000;
        assert_eq!(config.max_memory_bytes(), MAX_MEMORY_MB * 1024 * 1024);

        config.max_memory_mb = 200;
        assert_eq!(config.max_memory_bytes(), 200 * 1024 * 1024);
    }

    #[test]
    fn test_suppression_budget() {
        let config = SyncConfig::default();
        assert_eq!(config.suppression_budget(), Duration::from_millis(8250));
    }

    #[test]
    fn test_scan_config_has_workers() {
        assert!(ScanConfig::default().workers >= 1);
    }
}
