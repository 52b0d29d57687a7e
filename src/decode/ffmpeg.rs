//! Poster frames extracted with ffmpeg.
//!
//! ffprobe reads the stream duration, ffmpeg seeks to roughly a third of
//! the way in and writes a single keyframe as PNG to stdout. When no
//! ffmpeg binary can be found, or extraction fails for a file, the
//! header-only source supplies a neutral frame instead.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::Once;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info, warn};
#[cfg(unix)]
use wait_timeout::ChildExt;

use super::video::{ContainerPosterSource, PosterFrameSource};

/// Max time to wait for ffprobe/ffmpeg before killing the child.
const FF_TIMEOUT: Duration = Duration::from_secs(30);

/// Duration assumed when ffprobe does not report one.
const FALLBACK_DURATION: f64 = 60.0;

static FFMPEG_INIT: Once = Once::new();

/// Downloads ffmpeg through the sidecar when it is not on PATH.
pub fn ensure_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if which("ffmpeg") {
            debug!("Using system ffmpeg");
            return;
        }
        info!("ffmpeg not on PATH, downloading sidecar");
        match ffmpeg_sidecar::download::auto_download() {
            Ok(_) => info!("ffmpeg sidecar download complete"),
            Err(e) => warn!(error = %e, "ffmpeg download failed"),
        }
    });
}

/// Resolves a binary, preferring the system one over the sidecar.
fn resolve_bin(name: &str) -> Option<PathBuf> {
    if which(name) {
        return Some(PathBuf::from(name));
    }
    let dir = ffmpeg_sidecar::paths::sidecar_dir().ok()?;
    let bin = if cfg!(windows) {
        dir.join(format!("{name}.exe"))
    } else {
        dir.join(name)
    };
    bin.exists().then_some(bin)
}

fn which(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Seek position for the poster: 30% in, skipping at least the first
/// second unless the clip is too short for that.
fn seek_position(duration: f64) -> f64 {
    (duration * 0.3).max(1.0_f64.min(duration / 2.0)).max(0.0)
}

/// Parses `width,height,duration` as printed by ffprobe's csv writer.
fn parse_stream_duration(stdout: &str) -> f64 {
    stdout
        .lines()
        .next()
        .and_then(|line| line.trim().split(',').nth(2))
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(FALLBACK_DURATION)
}

/// Runs a child with a timeout, killing it when the limit is exceeded.
///
/// Both pipes are drained on helper threads so a large frame on stdout
/// cannot stall the child while we wait on it.
fn run_with_timeout(mut child: Child, timeout: Duration) -> Result<Output> {
    fn drain(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = pipe {
                pipe.read_to_end(&mut buf).ok();
            }
            buf
        })
    }
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    #[cfg(not(unix))]
    let wait_result: std::io::Result<Option<std::process::ExitStatus>> = {
        let _ = timeout;
        child.wait().map(Some)
    };
    #[cfg(unix)]
    let wait_result = child.wait_timeout(timeout);

    match wait_result {
        Ok(Some(status)) => Ok(Output {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        }),
        Ok(None) => {
            child.kill().ok();
            child.wait().ok();
            bail!("timed out after {}s", timeout.as_secs());
        }
        Err(e) => bail!("wait failed: {}", e),
    }
}

/// Poster source backed by the ffmpeg command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegPosterSource {
    download: bool,
    timeout: Duration,
    fallback: ContainerPosterSource,
}

impl Default for FfmpegPosterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegPosterSource {
    /// Fetches the ffmpeg sidecar on first use when it is missing.
    pub fn new() -> Self {
        Self {
            download: true,
            timeout: FF_TIMEOUT,
            fallback: ContainerPosterSource,
        }
    }

    /// Uses only binaries that are already installed.
    pub fn offline() -> Self {
        Self {
            download: false,
            ..Self::new()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether both ffmpeg and ffprobe can be resolved right now.
    pub fn is_available() -> bool {
        resolve_bin("ffmpeg").is_some() && resolve_bin("ffprobe").is_some()
    }

    /// Extracts a keyframe scaled to `target_width`, without fallback.
    pub fn extract(&self, path: &Path, target_width: u32) -> Result<DynamicImage> {
        let ffprobe = resolve_bin("ffprobe").context("ffprobe not available")?;
        let ffmpeg = resolve_bin("ffmpeg").context("ffmpeg not available")?;

        let stream_child = Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,duration",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("ffprobe failed to start")?;
        let stream = run_with_timeout(stream_child, self.timeout)?;
        if !stream.status.success() {
            let stderr = String::from_utf8_lossy(&stream.stderr);
            bail!(
                "ffprobe error: {}",
                stderr.lines().last().unwrap_or("unknown")
            );
        }

        let duration = parse_stream_duration(&String::from_utf8_lossy(&stream.stdout));
        let seek_to = seek_position(duration);
        debug!(?path, duration, seek_to, "Extracting poster frame");

        // Sparse keyframes can leave nothing after the seek point.
        let png = match self.grab_frame(&ffmpeg, path, seek_to, target_width) {
            Ok(png) => png,
            Err(e) if seek_to > 0.0 => {
                debug!(?path, error = %e, "No keyframe after seek, retrying from start");
                self.grab_frame(&ffmpeg, path, 0.0, target_width)?
            }
            Err(e) => return Err(e),
        };

        image::load_from_memory_with_format(&png, ImageFormat::Png)
            .with_context(|| format!("Failed to decode poster frame: {:?}", path))
    }

    /// Writes the first keyframe at or after `seek_to` as PNG bytes.
    fn grab_frame(
        &self,
        ffmpeg: &Path,
        path: &Path,
        seek_to: f64,
        target_width: u32,
    ) -> Result<Vec<u8>> {
        let child = Command::new(ffmpeg)
            .args(["-v", "error", "-ss", &format!("{:.2}", seek_to)])
            .args(["-skip_frame", "nokey", "-i"])
            .arg(path)
            .args([
                "-vframes",
                "1",
                "-vf",
                &format!("scale={}:-2", target_width.max(2)),
                "-pix_fmt",
                "rgb24",
                "-f",
                "image2pipe",
                "-vcodec",
                "png",
                "-y",
                "pipe:1",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("ffmpeg failed to start")?;
        let output = run_with_timeout(child, self.timeout)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "ffmpeg error: {}",
                stderr.lines().last().unwrap_or("unknown")
            );
        }
        if output.stdout.is_empty() {
            bail!("ffmpeg produced empty output");
        }
        Ok(output.stdout)
    }
}

impl PosterFrameSource for FfmpegPosterSource {
    fn poster_frame(&self, path: &Path, target_width: u32) -> Result<DynamicImage> {
        if self.download {
            ensure_ffmpeg();
        }
        if !Self::is_available() {
            debug!(?path, "ffmpeg unavailable, using container header");
            return self.fallback.poster_frame(path, target_width);
        }
        match self.extract(path, target_width) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                warn!(?path, error = %e, "Poster extraction failed, using container header");
                self.fallback.poster_frame(path, target_width)
            }
        }
    }
}
