//! Decoding of media files into display-sized bitmaps.
//!
//! Images are downsampled by a power-of-two factor chosen against the
//! display width and rotated upright from their EXIF orientation. Videos
//! get a poster frame with a play glyph drawn over it.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageFormat};
use tracing::{debug, trace};

use super::ffmpeg::FfmpegPosterSource;
use super::video::{overlay_play_glyph, PosterFrameSource};
use crate::models::MediaType;
use crate::scanner::{MetadataExtractor, Rotation};

/// Turns files into bitmaps no wider than necessary for the display.
#[derive(Clone)]
pub struct MediaDecoder {
    posters: Arc<dyn PosterFrameSource>,
}

impl MediaDecoder {
    /// Uses an installed ffmpeg for poster frames when there is one.
    pub fn new() -> Self {
        Self::with_poster_source(Arc::new(FfmpegPosterSource::offline()))
    }

    pub fn with_poster_source(posters: Arc<dyn PosterFrameSource>) -> Self {
        Self { posters }
    }

    pub fn decode(&self, path: &Path, target_width: u32) -> Result<DynamicImage> {
        match MediaType::from_path(path) {
            Some(MediaType::Video) => self.decode_video(path, target_width),
            Some(MediaType::Image) => Self::decode_image(path, target_width),
            None => Err(anyhow!("Unsupported media file: {:?}", path)),
        }
    }

    fn decode_image(path: &Path, target_width: u32) -> Result<DynamicImage> {
        let img = open_image(path)?;
        let (width, height) = img.dimensions();
        let factor = sample_size(width, height, target_width, 1);
        trace!(?path, width, height, factor, "Decoded image");

        let img = if factor > 1 {
            img.resize_exact(
                (width / factor).max(1),
                (height / factor).max(1),
                FilterType::Triangle,
            )
        } else {
            img
        };

        Ok(apply_rotation(img, MetadataExtractor::rotation(path)))
    }

    fn decode_video(&self, path: &Path, target_width: u32) -> Result<DynamicImage> {
        let frame = self.posters.poster_frame(path, target_width)?;
        let mut frame = frame.into_rgba8();
        overlay_play_glyph(&mut frame);
        debug!(?path, "Produced video poster");
        Ok(DynamicImage::ImageRgba8(frame))
    }
}

impl Default for MediaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest power of two `s` such that halving the raw size and dividing by
/// `s` still leaves both dimensions above the requested ones.
pub fn sample_size(raw_width: u32, raw_height: u32, req_width: u32, req_height: u32) -> u32 {
    let mut factor = 1;
    if raw_height > req_height || raw_width > req_width {
        let half_height = raw_height / 2;
        let half_width = raw_width / 2;
        while half_height / factor > req_height && half_width / factor > req_width {
            factor *= 2;
        }
    }
    factor
}

pub fn apply_rotation(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => img,
        Rotation::Cw90 => img.rotate90(),
        Rotation::Cw180 => img.rotate180(),
        Rotation::Cw270 => img.rotate270(),
    }
}

/// Opens an image, taking the first frame of animated GIFs.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    let format = image::guess_format(&bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes))
            .with_context(|| format!("Failed to decode GIF: {:?}", path))?;
        let frame = decoder
            .into_frames()
            .next()
            .ok_or_else(|| anyhow!("GIF has no frames: {:?}", path))?
            .context("Failed to decode GIF frame")?;
        return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(&bytes, fmt),
        None => image::load_from_memory(&bytes),
    }
    .with_context(|| format!("Failed to decode image: {:?}", path))
}
