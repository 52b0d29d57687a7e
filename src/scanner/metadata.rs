//! Timestamp and orientation extraction for media files.
//!
//! The effective timestamp of an entry is its embedded capture time when one
//! can be read, otherwise the file's modification time.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use exif::{Exif, In, Tag, Value};
use tracing::{trace, warn};

use crate::models::{Entry, MediaType};

/// Parses EXIF capture date-times.
///
/// Holds no mutable state, so one value can be shared freely between scan
/// workers. Times without an offset tag are read in `default_offset`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimeParser {
    default_offset: FixedOffset,
}

impl Default for CaptureTimeParser {
    fn default() -> Self {
        Self {
            default_offset: Utc.fix(),
        }
    }
}

impl CaptureTimeParser {
    pub fn with_default_offset(default_offset: FixedOffset) -> Self {
        Self { default_offset }
    }

    /// Reads `DateTimeOriginal` plus its sub-second and offset companions.
    pub fn parse(&self, exif: &Exif) -> Option<DateTime<Utc>> {
        let datetime = ascii_field(exif, Tag::DateTimeOriginal)?;
        let subsec = ascii_field(exif, Tag::SubSecTimeOriginal);
        let offset = ascii_field(exif, Tag::OffsetTimeOriginal);
        self.parse_fields(datetime, subsec, offset)
    }

    /// Parses the raw tag values, e.g. `b"2023:04:05 10:11:12"`, `b"250"`,
    /// `b"+02:00"`.
    ///
    /// Returns `None` for unparsable or all-zero date-times. A malformed
    /// sub-second or offset value is ignored rather than rejecting the time.
    pub fn parse_fields(
        &self,
        datetime: &[u8],
        subsec: Option<&[u8]>,
        offset: Option<&[u8]>,
    ) -> Option<DateTime<Utc>> {
        let mut dt = exif::DateTime::from_ascii(datetime).ok()?;
        if dt.year == 0 && dt.month == 0 && dt.day == 0 {
            return None;
        }
        if let Some(subsec) = subsec {
            if dt.parse_subsec(subsec).is_err() {
                trace!("Ignoring malformed sub-second capture time");
            }
        }
        if let Some(offset) = offset {
            if dt.parse_offset(offset).is_err() {
                trace!("Ignoring malformed capture time offset");
            }
        }

        let naive = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?
            .and_hms_nano_opt(
                dt.hour.into(),
                dt.minute.into(),
                dt.second.into(),
                dt.nanosecond.unwrap_or(0),
            )?;
        let zone = match dt.offset {
            Some(minutes) => FixedOffset::east_opt(i32::from(minutes) * 60)?,
            None => self.default_offset,
        };
        let local = zone.from_local_datetime(&naive).single()?;
        Some(local.with_timezone(&Utc))
    }
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<&[u8]> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref values) => values.first().map(Vec::as_slice),
        _ => None,
    }
}

/// Clockwise rotation needed to display an image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Maps the EXIF orientation tag. Mirrored orientations are shown as-is.
    pub fn from_exif_orientation(value: u32) -> Self {
        match value {
            3 => Self::Cw180,
            6 => Self::Cw90,
            8 => Self::Cw270,
            _ => Self::None,
        }
    }
}

/// Builds entries from files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor {
    parser: CaptureTimeParser,
}

impl MetadataExtractor {
    pub fn new(parser: CaptureTimeParser) -> Self {
        Self { parser }
    }

    /// Builds the entry for `path`, or `None` if it is not a supported,
    /// readable media file.
    pub fn entry_for(&self, path: &Path) -> Option<Entry> {
        let file_name = path.file_name()?.to_str()?.to_owned();
        let media_type = MediaType::from_file_name(&file_name)?;
        let timestamp = self.timestamp(path, media_type)?;
        Some(Entry::new(file_name, timestamp))
    }

    /// Capture time for images that carry one, modification time otherwise.
    pub fn timestamp(&self, path: &Path, media_type: MediaType) -> Option<DateTime<Utc>> {
        if media_type == MediaType::Image {
            if let Some(captured) = self.capture_time(path) {
                return Some(captured);
            }
            trace!(?path, "No capture time, falling back to modification time");
        }
        Self::modification_time(path)
    }

    pub fn capture_time(&self, path: &Path) -> Option<DateTime<Utc>> {
        let exif = read_exif(path)?;
        self.parser.parse(&exif)
    }

    pub fn modification_time(path: &Path) -> Option<DateTime<Utc>> {
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => Some(system_time_to_utc(modified)),
            Err(e) => {
                warn!(?path, error = %e, "Failed to read modification time");
                None
            }
        }
    }

    /// Rotation from the EXIF orientation tag, `Rotation::None` if absent.
    pub fn rotation(path: &Path) -> Rotation {
        read_exif(path)
            .and_then(|exif| {
                exif.get_field(Tag::Orientation, In::PRIMARY)
                    .and_then(|field| field.value.get_uint(0))
            })
            .map(Rotation::from_exif_orientation)
            .unwrap_or(Rotation::None)
    }
}

fn read_exif(path: &Path) -> Option<Exif> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader).ok()
}

pub fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_plain_datetime_as_utc() {
        let parser = CaptureTimeParser::default();
        let parsed = parser.parse_fields(b"2023:04:05 10:11:12", None, None);
        assert_eq!(parsed, Some(utc("2023-04-05T10:11:12Z")));
    }

    #[test]
    fn test_parse_with_subsec_and_offset() {
        let parser = CaptureTimeParser::default();
        let parsed = parser.parse_fields(b"2023:04:05 10:11:12", Some(b"25".as_slice()), Some(b"+02:00".as_slice()));
        assert_eq!(parsed, Some(utc("2023-04-05T08:11:12.25Z")));
    }

    #[test]
    fn test_parse_uses_injected_default_offset() {
        let parser = CaptureTimeParser::with_default_offset(FixedOffset::west_opt(3600).unwrap());
        let parsed = parser.parse_fields(b"2023:04:05 10:11:12", None, None);
        assert_eq!(parsed, Some(utc("2023-04-05T11:11:12Z")));
    }

    #[test]
    fn test_parse_rejects_all_zero() {
        let parser = CaptureTimeParser::default();
        assert_eq!(parser.parse_fields(b"0000:00:00 00:00:00", None, None), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let parser = CaptureTimeParser::default();
        assert_eq!(parser.parse_fields(b"yesterday", None, None), None);
        assert_eq!(parser.parse_fields(b"2023:13:45 10:11:12", None, None), None);
    }

    #[test]
    fn test_malformed_offset_is_ignored() {
        let parser = CaptureTimeParser::default();
        let parsed = parser.parse_fields(b"2023:04:05 10:11:12", None, Some(b"bogus".as_slice()));
        assert_eq!(parsed, Some(utc("2023-04-05T10:11:12Z")));
    }

    #[test]
    fn test_rotation_mapping() {
        assert_eq!(Rotation::from_exif_orientation(1), Rotation::None);
        assert_eq!(Rotation::from_exif_orientation(3), Rotation::Cw180);
        assert_eq!(Rotation::from_exif_orientation(6), Rotation::Cw90);
        assert_eq!(Rotation::from_exif_orientation(8), Rotation::Cw270);
        assert_eq!(Rotation::from_exif_orientation(2), Rotation::None);
    }

    #[test]
    fn test_entry_falls_back_to_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.png");
        image::RgbImage::new(2, 2).save(&path).unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_600_000_000, 0))
            .unwrap();

        let entry = MetadataExtractor::default().entry_for(&path).unwrap();
        assert_eq!(entry.file_name, "plain.png");
        assert_eq!(entry.timestamp.timestamp(), 1_600_000_000);
    }

    #[test]
    fn test_corrupt_image_still_gets_entry() {
        let mut temp = NamedTempFile::with_suffix(".jpg").unwrap();
        temp.write_all(b"not a real jpeg file").unwrap();

        let entry = MetadataExtractor::default().entry_for(temp.path());
        assert!(entry.is_some());
        assert_eq!(MetadataExtractor::rotation(temp.path()), Rotation::None);
    }

    #[test]
    fn test_unsupported_file_has_no_entry() {
        let mut temp = NamedTempFile::with_suffix(".txt").unwrap();
        temp.write_all(b"hello").unwrap();
        assert!(MetadataExtractor::default().entry_for(temp.path()).is_none());
    }
}
