//! Directory scanner producing time-ordered entries for one pane.
//!
//! This module provides the `FileScanner` struct which handles:
//! - Flat directory listing using walkdir (panes never recurse)
//! - Filtering to visible, supported media files
//! - Parallel timestamp extraction across worker threads
//!
//! Scanning never touches a registry, so it can run while the UI thread reads
//! the current one.

use std::path::{Path, PathBuf};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::models::{Entry, MediaType};
use crate::scanner::metadata::MetadataExtractor;

/// Result of a completed scan: entries sorted newest first.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub entries: Vec<Entry>,
    /// Supported files whose timestamp could not be determined.
    pub error_count: usize,
}

pub struct FileScanner {
    config: ScanConfig,
    extractor: MetadataExtractor,
}

impl FileScanner {
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self {
            config,
            extractor: MetadataExtractor::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: MetadataExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Lists `dir` and builds sorted entries for every supported file.
    ///
    /// A missing or unreadable directory yields an empty result.
    pub fn scan(&self, dir: &Path) -> ScanResult {
        info!("Starting scan of {:?}", dir);
        let candidates = Self::discover_files(dir);
        debug!("Discovered {} media files", candidates.len());

        let (mut entries, error_count) = self.extract_parallel(candidates);
        sort_newest_first(&mut entries);

        info!(
            "Scan complete: {} entries, {} errors",
            entries.len(),
            error_count
        );
        ScanResult {
            entries,
            error_count,
        }
    }

    /// Collects regular, non-hidden files with a supported suffix.
    fn discover_files(dir: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true);

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    trace!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.starts_with('.') || MediaType::from_file_name(name).is_none() {
                continue;
            }
            files.push(entry.into_path());
        }
        files
    }

    fn extract_parallel(&self, candidates: Vec<PathBuf>) -> (Vec<Entry>, usize) {
        if candidates.is_empty() {
            return (Vec::new(), 0);
        }

        let num_workers = self.config.workers.clamp(1, candidates.len());
        let chunk_size = candidates.len().div_ceil(num_workers);
        let entries = Mutex::new(Vec::with_capacity(candidates.len()));
        let errors = Mutex::new(0usize);
        let extractor = self.extractor;

        thread::scope(|scope| {
            for (worker_id, chunk) in candidates.chunks(chunk_size).enumerate() {
                let entries = &entries;
                let errors = &errors;
                scope.spawn(move || {
                    let mut local = Vec::with_capacity(chunk.len());
                    let mut local_errors = 0;
                    for path in chunk {
                        match extractor.entry_for(path) {
                            Some(entry) => local.push(entry),
                            None => {
                                warn!(worker_id, ?path, "Could not determine timestamp");
                                local_errors += 1;
                            }
                        }
                    }
                    entries.lock().extend(local);
                    *errors.lock() += local_errors;
                });
            }
        });

        (entries.into_inner(), errors.into_inner())
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest first; ties ordered by file name so repeated scans agree.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn create_test_image(path: &Path, mtime: i64) {
        image::RgbImage::new(1, 1).save(path).unwrap();
        set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    fn names(result: &ScanResult) -> Vec<&str> {
        result.entries.iter().map(|e| e.file_name.as_str()).collect()
    }

    #[test]
    fn test_scan_empty_dir() {
        let dir = tempdir().unwrap();
        let result = FileScanner::new().scan(dir.path());
        assert!(result.entries.is_empty());
        assert_eq!(result.error_count, 0);
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let result = FileScanner::new().scan(&dir.path().join("gone"));
        assert!(result.entries.is_empty());
    }

    #[test]
    fn test_scan_sorts_newest_first() {
        let dir = tempdir().unwrap();
        create_test_image(&dir.path().join("eight.png"), 8 * 3600);
        create_test_image(&dir.path().join("ten.png"), 10 * 3600);
        create_test_image(&dir.path().join("nine.png"), 9 * 3600);

        let result = FileScanner::new().scan(dir.path());
        assert_eq!(names(&result), vec!["ten.png", "nine.png", "eight.png"]);
    }

    #[test]
    fn test_scan_filters_hidden_unsupported_and_dirs() {
        let dir = tempdir().unwrap();
        create_test_image(&dir.path().join("keep.png"), 100);
        create_test_image(&dir.path().join(".hidden.png"), 100);
        File::create(dir.path().join("notes.txt")).unwrap();
        fs::create_dir(dir.path().join("folder.jpg")).unwrap();
        create_test_image(&dir.path().join("folder.jpg").join("nested.png"), 100);

        let result = FileScanner::new().scan(dir.path());
        assert_eq!(names(&result), vec!["keep.png"]);
    }

    #[test]
    fn test_scan_single_worker_matches_parallel() {
        let dir = tempdir().unwrap();
        for i in 0..12 {
            create_test_image(&dir.path().join(format!("img{i:02}.png")), 1000 + i);
        }

        let serial = FileScanner::with_config(ScanConfig { workers: 1 }).scan(dir.path());
        let parallel = FileScanner::with_config(ScanConfig { workers: 5 }).scan(dir.path());
        assert_eq!(names(&serial), names(&parallel));
        assert_eq!(serial.entries.len(), 12);
        assert_eq!(serial.entries[0].file_name, "img11.png");
    }

    #[test]
    fn test_sort_ties_by_name() {
        use chrono::{TimeZone, Utc};
        let ts = Utc.timestamp_opt(5, 0).unwrap();
        let mut entries = vec![Entry::new("b.jpg", ts), Entry::new("a.jpg", ts)];
        sort_newest_first(&mut entries);
        assert_eq!(entries[0].file_name, "a.jpg");
    }
}
