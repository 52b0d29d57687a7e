//! Directory scanning and timestamp extraction.

pub mod file_scanner;
pub mod metadata;

pub use file_scanner::{FileScanner, ScanResult};
pub use metadata::{CaptureTimeParser, MetadataExtractor, Rotation};
