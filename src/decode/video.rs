//! Poster frames for video entries.
//!
//! Frame extraction is behind the `PosterFrameSource` trait. The ffmpeg
//! source in `ffmpeg.rs` is the default; the header-only source here reads
//! the container's declared dimensions and renders a neutral frame with
//! the right aspect ratio when ffmpeg cannot be used. The play glyph is
//! drawn on top by the loader either way.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, trace};

/// Aspect ratio assumed when the container does not declare dimensions.
const FALLBACK_DIMENSIONS: (u32, u32) = (16, 9);

/// Number of leading bytes searched for track headers.
const HEADER_SCAN_BYTES: u64 = 128 * 1024;

const FRAME_FILL: Rgba<u8> = Rgba([32, 32, 36, 255]);

/// Produces a representative frame for a video file.
pub trait PosterFrameSource: Send + Sync {
    fn poster_frame(&self, path: &Path, target_width: u32) -> Result<DynamicImage>;
}

/// Poster source that only inspects container headers, used when ffmpeg
/// is missing or cannot read the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerPosterSource;

impl PosterFrameSource for ContainerPosterSource {
    fn poster_frame(&self, path: &Path, target_width: u32) -> Result<DynamicImage> {
        let (width, height) = match video_dimensions(path)? {
            Some(dims) => dims,
            None => {
                debug!(?path, "No dimensions in container, using fallback aspect");
                FALLBACK_DIMENSIONS
            }
        };
        let frame_width = target_width.max(1);
        let frame_height = ((frame_width as u64 * height as u64) / width as u64).max(1) as u32;
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            frame_width,
            frame_height,
            FRAME_FILL,
        )))
    }
}

/// Reads declared video dimensions from MP4/3GP or Matroska/WebM headers.
///
/// Returns `Ok(None)` when the container is readable but nothing was found.
pub fn video_dimensions(path: &Path) -> Result<Option<(u32, u32)>> {
    let mut buffer = Vec::new();
    File::open(path)
        .with_context(|| format!("Failed to open video: {:?}", path))?
        .take(HEADER_SCAN_BYTES)
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read video header: {:?}", path))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let dims = match ext.as_str() {
        "mkv" | "webm" => parse_matroska_dimensions(&buffer),
        "mp4" | "3gp" => parse_mp4_dimensions(&buffer),
        _ => parse_mp4_dimensions(&buffer).or_else(|| parse_matroska_dimensions(&buffer)),
    };
    trace!(?path, ?dims, "Parsed container dimensions");
    Ok(dims)
}

/// Finds a `tkhd` box with non-zero 16.16 dimensions, falling back to the
/// sample entry of a video codec.
fn parse_mp4_dimensions(buffer: &[u8]) -> Option<(u32, u32)> {
    for i in 0..buffer.len().saturating_sub(92) {
        if &buffer[i..i + 4] != b"tkhd" {
            continue;
        }
        let offset = if buffer[i + 4] == 0 { i + 76 } else { i + 88 };
        if offset + 8 > buffer.len() {
            continue;
        }
        let width = read_be_u32(&buffer[offset..]) >> 16;
        let height = read_be_u32(&buffer[offset + 4..]) >> 16;
        // Audio tracks carry zero dimensions.
        if width > 0 && height > 0 {
            return Some((width, height));
        }
    }

    for i in 0..buffer.len().saturating_sub(28) {
        let tag = &buffer[i..i + 4];
        if tag == b"avc1" || tag == b"hvc1" || tag == b"mp4v" || tag == b"s263" {
            let width = u16::from_be_bytes([buffer[i + 24], buffer[i + 25]]) as u32;
            let height = u16::from_be_bytes([buffer[i + 26], buffer[i + 27]]) as u32;
            if width > 0 && height > 0 {
                return Some((width, height));
            }
        }
    }
    None
}

/// Scans for the PixelWidth (0xB0) and PixelHeight (0xBA) elements.
fn parse_matroska_dimensions(buffer: &[u8]) -> Option<(u32, u32)> {
    let mut width = 0;
    let mut height = 0;
    for i in 0..buffer.len().saturating_sub(2) {
        match buffer[i] {
            0xB0 if width == 0 => width = read_ebml_uint(&buffer[i + 1..]).unwrap_or(0),
            0xBA if height == 0 => height = read_ebml_uint(&buffer[i + 1..]).unwrap_or(0),
            _ => {}
        }
        if width > 0 && height > 0 {
            return Some((width, height));
        }
    }
    None
}

/// Reads an element whose size is a one-byte-or-longer VINT followed by a
/// big-endian unsigned payload of that size.
fn read_ebml_uint(data: &[u8]) -> Option<u32> {
    let first = *data.first()?;
    if first == 0 {
        return None;
    }
    let size_len = first.leading_zeros() as usize + 1;
    if size_len > 8 || size_len > data.len() {
        return None;
    }
    let mut size = (first as u64) & (0xFF >> size_len);
    for &byte in &data[1..size_len] {
        size = (size << 8) | byte as u64;
    }
    let size = size as usize;
    if size == 0 || size > 4 || size_len + size > data.len() {
        return None;
    }
    let value = data[size_len..size_len + size]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32);
    (value > 0 && value < 65536).then_some(value)
}

fn read_be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Draws a centered play glyph sized to three quarters of the frame's
/// shorter side.
pub fn overlay_play_glyph(frame: &mut RgbaImage) {
    let (width, height) = frame.dimensions();
    let size = width.min(height) * 3 / 4;
    if size < 4 {
        return;
    }
    let radius = size as f32 / 2.0;
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    // Triangle pointing right, inset inside the disc.
    let a = (cx - radius * 0.35, cy - radius * 0.45);
    let b = (cx - radius * 0.35, cy + radius * 0.45);
    let c = (cx + radius * 0.5, cy);

    let left = (cx - radius).max(0.0) as u32;
    let top = (cy - radius).max(0.0) as u32;
    let right = ((cx + radius).ceil() as u32).min(width);
    let bottom = ((cy + radius).ceil() as u32).min(height);

    for y in top..bottom {
        for x in left..right {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            let dx = px - cx;
            let dy = py - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let pixel = frame.get_pixel_mut(x, y);
            if in_triangle((px, py), a, b, c) {
                *pixel = Rgba([255, 255, 255, 255]);
            } else {
                for channel in &mut pixel.0[..3] {
                    *channel /= 2;
                }
                pixel.0[3] = pixel.0[3].max(192);
            }
        }
    }
}

fn in_triangle(p: (f32, f32), a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> bool {
    fn edge(p: (f32, f32), q: (f32, f32), r: (f32, f32)) -> f32 {
        (p.0 - r.0) * (q.1 - r.1) - (q.0 - r.0) * (p.1 - r.1)
    }
    let d1 = edge(p, a, b);
    let d2 = edge(p, b, c);
    let d3 = edge(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn tkhd_box(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data.extend_from_slice(b"tkhd");
        let mut body = vec![0u8; 84];
        body[72..76].copy_from_slice(&(width << 16).to_be_bytes());
        body[76..80].copy_from_slice(&(height << 16).to_be_bytes());
        data.extend_from_slice(&body);
        data.extend_from_slice(&[0u8; 16]);
        data
    }

    #[test]
    fn test_mp4_tkhd_dimensions() {
        let buffer = tkhd_box(1920, 1080);
        assert_eq!(parse_mp4_dimensions(&buffer), Some((1920, 1080)));
    }

    #[test]
    fn test_mp4_skips_audio_track() {
        let mut buffer = tkhd_box(0, 0);
        buffer.extend(tkhd_box(640, 480));
        assert_eq!(parse_mp4_dimensions(&buffer), Some((640, 480)));
    }

    #[test]
    fn test_matroska_dimensions() {
        // PixelWidth 1280 (size 2), PixelHeight 720 (size 2).
        let buffer = [0x00, 0xB0, 0x82, 0x05, 0x00, 0xBA, 0x82, 0x02, 0xD0, 0x00];
        assert_eq!(parse_matroska_dimensions(&buffer), Some((1280, 720)));
    }

    #[test]
    fn test_poster_uses_container_aspect() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, tkhd_box(400, 200)).unwrap();

        let frame = ContainerPosterSource.poster_frame(&path, 300).unwrap();
        assert_eq!((frame.width(), frame.height()), (300, 150));
    }

    #[test]
    fn test_poster_falls_back_for_unknown_container() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        fs::write(&path, b"not a real container").unwrap();

        let frame = ContainerPosterSource.poster_frame(&path, 160).unwrap();
        assert_eq!((frame.width(), frame.height()), (160, 90));
    }

    #[test]
    fn test_poster_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(ContainerPosterSource
            .poster_frame(&dir.path().join("gone.mp4"), 100)
            .is_err());
    }

    #[test]
    fn test_play_glyph_is_centered() {
        let mut frame = RgbaImage::from_pixel(100, 60, FRAME_FILL);
        overlay_play_glyph(&mut frame);

        // Triangle covers the center, corners stay untouched.
        assert_eq!(frame.get_pixel(50, 30), &Rgba([255, 255, 255, 255]));
        assert_eq!(frame.get_pixel(0, 0), &FRAME_FILL);
        assert_eq!(frame.get_pixel(99, 59), &FRAME_FILL);
        // Inside the disc but outside the triangle is darkened.
        assert_ne!(frame.get_pixel(50, 9), &FRAME_FILL);
    }
}
