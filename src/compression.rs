//! Lossy re-encode pass for rendered videos.
//!
//! Each frame is scaled down by the tier factor and back up before encoding at
//! the tier's quantizer. Glyph edges soften, which the encoder turns into a much
//! smaller file.

use clap::ValueEnum;
use image::imageops::{self, FilterType};
use image::GrayImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{GlyphTileError, Result};
use crate::video::{FfmpegConfig, FrameReader, FrameWriter, VideoInfo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Smallest output.
    Low,
    #[default]
    Medium,
    /// Largest output, closest to the original.
    High,
}

impl CompressionLevel {
    /// Fraction of the frame size kept by the down/up scale.
    pub fn scale(self) -> f64 {
        match self {
            CompressionLevel::Low => 0.3,
            CompressionLevel::Medium => 0.5,
            CompressionLevel::High => 0.7,
        }
    }

    /// MPEG-4 quantizer for the re-encode.
    pub fn qscale(self) -> u32 {
        match self {
            CompressionLevel::Low => 12,
            CompressionLevel::Medium => 8,
            CompressionLevel::High => 4,
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        })
    }
}

impl FromStr for CompressionLevel {
    type Err = GlyphTileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            other => Err(GlyphTileError::invalid(
                "compression",
                format!("unknown level '{}', expected low, medium or high", other),
            )),
        }
    }
}

/// Removes a file when dropped unless [`TempFileGuard::persist`] was called.
pub struct TempFileGuard {
    path: PathBuf,
    keep: bool,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOutcome {
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressionOutcome {
    pub fn saved_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (self.original_size as f64 - self.compressed_size as f64) / self.original_size as f64 * 100.0
    }
}

/// `<stem>_compressed.<ext>` next to `path`.
pub fn compressed_path(path: &Path) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GlyphTileError::invalid("output", format!("{} has no file name", path.display())))?;
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_compressed.{}", stem, ext),
        None => format!("{}_compressed", stem),
    };
    Ok(path.with_file_name(name))
}

/// Downscale by `scale` (truncating, at least one pixel) and scale back to the frame size.
pub fn degrade_frame(frame: &GrayImage, scale: f64) -> GrayImage {
    let (w, h) = frame.dimensions();
    let small_w = ((w as f64 * scale) as u32).max(1);
    let small_h = ((h as f64 * scale) as u32).max(1);
    let small = imageops::resize(frame, small_w, small_h, FilterType::Triangle);
    imageops::resize(&small, w, h, FilterType::Triangle)
}

/// Re-encode the video at `path` in place.
///
/// The re-encode goes to a temporary sibling file that replaces the original
/// only once it is complete; on any failure the original is untouched and the
/// temporary file is removed.
pub fn compress_video(path: &Path, level: CompressionLevel, ffmpeg: &FfmpegConfig) -> Result<CompressionOutcome> {
    let info = VideoInfo::probe(path, ffmpeg)?;
    let tmp = TempFileGuard::new(compressed_path(path)?);
    debug!("compressing {} at {} into {}", path.display(), level, tmp.path().display());

    {
        let mut reader = FrameReader::spawn(path, &info, None, ffmpeg)?;
        let mut writer = FrameWriter::spawn(tmp.path(), &info, level.qscale(), ffmpeg)?;
        while let Some(frame) = reader.next_frame()? {
            writer.write_frame(&degrade_frame(&frame, level.scale()))?;
        }
        reader.finish()?;
        writer.finish()?;
    }

    let outcome = CompressionOutcome {
        original_size: fs::metadata(path)?.len(),
        compressed_size: fs::metadata(tmp.path())?.len(),
    };
    fs::rename(tmp.path(), path)?;
    tmp.persist();

    info!(
        "compressed {}: {:.2} MB -> {:.2} MB ({:.1}% saved)",
        path.display(),
        outcome.original_size as f64 / (1024.0 * 1024.0),
        outcome.compressed_size as f64 / (1024.0 * 1024.0),
        outcome.saved_percent()
    );
    Ok(outcome)
}
