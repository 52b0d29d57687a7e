use std::hash::{Hash, Hasher};
use std::path::Path;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "bmp" | "gif" | "jpg" | "jpeg" | "png" | "webp" | "heic" | "heif" => Some(Self::Image),
            "3gp" | "mkv" | "mp4" | "ts" | "webm" => Some(Self::Video),
            _ => None,
        }
    }

    /// Classifies a bare file name by its suffix.
    ///
    /// A leading dot does not start a suffix, so `.jpg` has none.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        match file_name.rfind('.') {
            Some(dot) if dot > 0 => Self::from_extension(&file_name[dot + 1..]),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_file_name)
    }

    pub fn is_video(self) -> bool {
        self == Self::Video
    }
}

/// One displayable file in a pane.
///
/// Identity is the file name: two entries with the same name are the same
/// entry regardless of timestamp.
#[derive(Debug, Clone)]
pub struct Entry {
    pub file_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    pub fn new(file_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            file_name: file_name.into(),
            timestamp,
        }
    }

    pub fn media_type(&self) -> Option<MediaType> {
        MediaType::from_file_name(&self.file_name)
    }

    pub fn is_video(&self) -> bool {
        self.media_type().is_some_and(MediaType::is_video)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.file_name == other.file_name
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file_name.hash(state);
    }
}
