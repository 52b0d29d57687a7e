//! Decoding and caching of display bitmaps.

pub mod cache;
pub mod ffmpeg;
pub mod loader;
pub mod memory;
pub mod queue;
pub mod video;

pub use cache::{DecodeCache, DecodedImage};
pub use ffmpeg::FfmpegPosterSource;
pub use loader::MediaDecoder;
pub use memory::{FixedMemoryProbe, MemoryProbe, SystemMemoryProbe};
pub use queue::PrewarmQueue;
pub use video::{ContainerPosterSource, PosterFrameSource};
