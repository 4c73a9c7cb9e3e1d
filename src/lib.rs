//! # glyphtile - Glyph Tiling Library
//!
//! `glyphtile` turns images and videos into ASCII art by tiling them with glyph
//! images. Every tile of the source is replaced by the glyph whose brightness is
//! closest to the tile's mean intensity, so the output is a picture made of
//! characters at exactly the size of the input.
//!
//! ## Features
//!
//! - Brightness index over any directory of same-sized glyph images
//! - Single image and video conversion
//! - Glyph set generation from a TrueType/OpenType font
//! - Optional lossy re-encode of rendered videos
//! - Progress reporting for integration with UI applications
//!
//! ## Example
//!
//! ```no_run
//! use glyphtile::{AsciiConverter, ConversionOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = AsciiConverter::new();
//! let options = ConversionOptions::default()
//!     .with_columns(120)
//!     .with_glyph_dir("glyphs");
//! converter.convert_image(Path::new("input.png"), Path::new("output.png"), &options)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use glyphtile::{AsciiConverter, ConversionOptions, ProgressPhase, VideoOptions};
//! use std::path::Path;
//!
//! let converter = AsciiConverter::new();
//! let video_opts = VideoOptions::default().with_window(2.0, Some(5.0));
//! let conv_opts = ConversionOptions::default();
//!
//! converter
//!     .convert_video_with_progress(
//!         Path::new("video.mp4"),
//!         Path::new("video_ascii.mp4"),
//!         &video_opts,
//!         &conv_opts,
//!         |progress| match progress.phase {
//!             ProgressPhase::BuildingIndex => println!("Scoring glyphs..."),
//!             ProgressPhase::ConvertingFrames => {
//!                 println!("Converting: {}/{} ({:.1}%)", progress.completed, progress.total, progress.percentage);
//!             }
//!             ProgressPhase::Compressing => println!("Compressing..."),
//!             ProgressPhase::Complete => println!("Done!"),
//!         },
//!     )
//!     .unwrap();
//! ```

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod brightness;
pub mod cache;
pub mod compression;
pub mod config;
pub mod error;
pub mod glyphs;
pub mod stats;
pub mod tiling;
pub mod video;

pub use brightness::{BrightnessIndex, ErosionParams, GlyphEntry, IndexBuild};
pub use cache::GlyphCache;
pub use compression::{compress_video, CompressionLevel, CompressionOutcome};
pub use config::{AppConfig, Preset};
pub use error::GlyphTileError;
pub use tiling::{render_image, Renderer, Tile, TileGrid};
pub use video::{FfmpegConfig, FrameWindow, VideoInfo};

use video::{FrameReader, FrameWriter};

/// Accepted extensions for source and rendered images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
/// Accepted extensions for source videos.
pub const VIDEO_INPUT_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];
/// Accepted extensions for rendered videos.
pub const VIDEO_OUTPUT_EXTENSIONS: &[&str] = &["mp4", "avi"];

/// MPEG-4 quantizer for the first encode of a rendered video.
const RENDER_QSCALE: u32 = 2;

/// Fail with [`GlyphTileError::UnsupportedExtension`] unless `path` ends in one of `allowed`.
pub fn check_extension(path: &Path, allowed: &[&str]) -> error::Result<()> {
    if brightness::has_extension(path, allowed) {
        return Ok(());
    }
    Err(GlyphTileError::UnsupportedExtension {
        path: path.to_path_buf(),
        expected: allowed.join(", "),
    })
}

/// Represents the current phase of a conversion operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Scoring the glyph set and resizing it to the tile size
    BuildingIndex,
    /// Rendering selected frames
    ConvertingFrames,
    /// Re-encoding the rendered video
    Compressing,
    Complete,
}

/// Progress information for conversion operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Number of items completed in the current phase
    pub completed: usize,
    /// Total number of items in the current phase (0 if indeterminate)
    pub total: usize,
    /// 0.0 to 100.0
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn building_index() -> Self {
        Self {
            phase: ProgressPhase::BuildingIndex,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Scoring glyphs...".to_string(),
        }
    }

    pub fn converting_frames(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::ConvertingFrames,
            completed,
            total,
            percentage,
            message: format!("Rendering frame {} of {}", completed, total),
        }
    }

    pub fn compressing(level: CompressionLevel) -> Self {
        Self {
            phase: ProgressPhase::Compressing,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: format!("Compressing video ({})...", level),
        }
    }

    pub fn complete(frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: frames,
            total: frames,
            percentage: 100.0,
            message: format!("Conversion complete: {} frames", frames),
        }
    }
}

/// Options shared by image and video conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Requested number of glyph columns
    pub columns: u32,
    pub erosion: ErosionParams,
    /// Directory of same-sized glyph images
    pub glyph_dir: PathBuf,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            columns: 200,
            erosion: ErosionParams::default(),
            glyph_dir: PathBuf::from("glyphs"),
        }
    }
}

impl ConversionOptions {
    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_erosion(mut self, erosion: ErosionParams) -> Self {
        self.erosion = erosion;
        self
    }

    pub fn with_glyph_dir(mut self, glyph_dir: impl Into<PathBuf>) -> Self {
        self.glyph_dir = glyph_dir.into();
        self
    }

    /// Create options from a preset
    pub fn from_preset(preset: &Preset, glyph_dir: PathBuf) -> Self {
        Self {
            columns: preset.columns,
            erosion: preset.erosion(),
            glyph_dir,
        }
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.columns == 0 {
            return Err(GlyphTileError::invalid("columns", "must be at least 1"));
        }
        self.erosion.validate()
    }
}

/// Options for video conversion
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOptions {
    /// Start of the converted window in seconds
    pub start: f64,
    /// End of the converted window in seconds; `None` runs to the end of the video
    pub end: Option<f64>,
    /// Keep every `floor(speed_multiplier)`-th frame; at least 1.0
    pub speed_multiplier: f64,
    pub compression: Option<CompressionLevel>,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: None,
            speed_multiplier: 1.0,
            compression: Some(CompressionLevel::default()),
        }
    }
}

impl VideoOptions {
    pub fn with_window(mut self, start: f64, end: Option<f64>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_speed_multiplier(mut self, speed_multiplier: f64) -> Self {
        self.speed_multiplier = speed_multiplier;
        self
    }

    pub fn with_compression(mut self, compression: Option<CompressionLevel>) -> Self {
        self.compression = compression;
        self
    }

    pub fn validate(&self) -> error::Result<()> {
        video::check_time_window(self.start, self.end)?;
        video::check_speed_multiplier(self.speed_multiplier)
    }
}

/// What a video conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSummary {
    pub frames_written: u64,
    pub window: FrameWindow,
    pub grid: TileGrid,
    /// `None` when compression was disabled or failed and the uncompressed render was kept.
    pub compression: Option<CompressionOutcome>,
}

/// Main converter struct for glyph-tiled images and videos
pub struct AsciiConverter {
    config: AppConfig,
}

impl AsciiConverter {
    /// Create a new converter with default configuration
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load configuration from a `.toml` or `.json` file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self {
            config: AppConfig::from_file(path)?,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Score the glyph set; skipped glyph files are logged and otherwise ignored.
    pub fn load_index(&self, options: &ConversionOptions) -> Result<BrightnessIndex> {
        let build = BrightnessIndex::from_dir(&options.glyph_dir, options.erosion)?;
        for skipped in &build.skipped {
            warn!("{}", skipped);
        }
        info!(
            "indexed {} glyphs from {} (aspect ratio {:.3})",
            build.index.len(),
            options.glyph_dir.display(),
            build.index.aspect_ratio()
        );
        Ok(build.index)
    }

    /// Render a grayscale image, returning the canvas and the grid it was cut into.
    pub fn render_gray(&self, source: &GrayImage, options: &ConversionOptions) -> Result<(GrayImage, TileGrid)> {
        options.validate()?;
        let index = self.load_index(options)?;
        let grid = TileGrid::new(source.width(), source.height(), options.columns, index.aspect_ratio())?;
        let cache = GlyphCache::build(&index, grid.tile_width, grid.tile_height)?;
        let canvas = Renderer::new(&index, &cache).render(source, &grid)?;
        Ok((canvas, grid))
    }

    /// Read `input` and render it without writing anything.
    pub fn image_to_canvas(&self, input: &Path, options: &ConversionOptions) -> Result<GrayImage> {
        options.validate()?;
        check_extension(input, IMAGE_EXTENSIONS)?;
        let source = open_source(input)?;
        Ok(self.render_gray(&source, options)?.0)
    }

    /// Convert a single image to a glyph-tiled image of the same size
    ///
    /// # Example
    ///
    /// ```no_run
    /// use glyphtile::{AsciiConverter, ConversionOptions};
    /// use std::path::Path;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let converter = AsciiConverter::new();
    /// let grid = converter.convert_image(
    ///     Path::new("image.jpg"),
    ///     Path::new("image_ascii.png"),
    ///     &ConversionOptions::default().with_columns(80),
    /// )?;
    /// println!("{} x {} glyphs", grid.cols, grid.rows);
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert_image(&self, input: &Path, output: &Path, options: &ConversionOptions) -> Result<TileGrid> {
        options.validate()?;
        check_extension(input, IMAGE_EXTENSIONS)?;
        check_extension(output, IMAGE_EXTENSIONS)?;

        let source = open_source(input)?;
        let (canvas, grid) = self.render_gray(&source, options)?;
        create_parent_dir(output)?;
        canvas
            .save(output)
            .with_context(|| format!("writing {}", output.display()))?;
        info!("wrote {} ({}x{} glyphs)", output.display(), grid.cols, grid.rows);
        Ok(grid)
    }

    pub fn convert_video(
        &self,
        input: &Path,
        output: &Path,
        video_opts: &VideoOptions,
        conv_opts: &ConversionOptions,
    ) -> Result<VideoSummary> {
        self.convert_video_with_progress(input, output, video_opts, conv_opts, |_| {})
    }

    /// Convert the selected window of a video frame by frame
    ///
    /// The glyph index and the resized glyph cache are built once and shared by
    /// every frame. The output keeps the source frame rate and size. When
    /// compression is enabled and fails, the uncompressed render is kept and the
    /// failure is logged.
    pub fn convert_video_with_progress<F>(
        &self,
        input: &Path,
        output: &Path,
        video_opts: &VideoOptions,
        conv_opts: &ConversionOptions,
        progress_callback: F,
    ) -> Result<VideoSummary>
    where
        F: Fn(Progress),
    {
        conv_opts.validate()?;
        video_opts.validate()?;
        check_extension(input, VIDEO_INPUT_EXTENSIONS)?;
        check_extension(output, VIDEO_OUTPUT_EXTENSIONS)?;
        if !input.is_file() {
            return Err(GlyphTileError::SourceUnreadable {
                path: input.to_path_buf(),
                reason: "no such file".to_string(),
            }
            .into());
        }

        let ffmpeg = &self.config.ffmpeg;
        let info = VideoInfo::probe(input, ffmpeg)?;
        let window = FrameWindow::new(
            info.fps,
            info.total_frames,
            video_opts.start,
            video_opts.end,
            video_opts.speed_multiplier,
        )?;
        info!(
            "{}: {}x{} at {:.3} fps, frames {}..={} step {} ({} frames)",
            input.display(),
            info.width,
            info.height,
            info.fps,
            window.start_frame,
            window.end_frame,
            window.step,
            window.len()
        );

        progress_callback(Progress::building_index());
        let index = self.load_index(conv_opts)?;
        let grid = TileGrid::new(info.width, info.height, conv_opts.columns, index.aspect_ratio())?;
        let cache = GlyphCache::build(&index, grid.tile_width, grid.tile_height)?;
        let renderer = Renderer::new(&index, &cache);
        debug!(
            "grid {}x{} tiles of {}x{} px",
            grid.cols, grid.rows, grid.tile_width, grid.tile_height
        );

        create_parent_dir(output)?;
        let total = window.len() as usize;
        let mut written: u64 = 0;
        {
            let mut reader = FrameReader::spawn(input, &info, Some(window.end_frame + 1), ffmpeg)?;
            let mut writer = FrameWriter::spawn(output, &info, RENDER_QSCALE, ffmpeg)?;
            let mut frame_index: u64 = 0;
            // The decoder stops by itself after `end_frame`.
            while let Some(frame) = reader.next_frame()? {
                if window.selects(frame_index) {
                    let canvas = renderer.render(&frame, &grid)?;
                    writer.write_frame(&canvas)?;
                    written += 1;
                    progress_callback(Progress::converting_frames(written as usize, total));
                }
                frame_index += 1;
            }
            reader
                .finish()
                .with_context(|| format!("decoding {}", input.display()))?;
            writer
                .finish()
                .with_context(|| format!("encoding {}", output.display()))?;
        }
        if written == 0 {
            return Err(anyhow!("no frames decoded from {}", input.display()));
        }
        if written < window.len() {
            warn!(
                "{} ended early: wrote {} of {} frames",
                input.display(),
                written,
                window.len()
            );
        }
        info!("wrote {} frames to {}", written, output.display());

        let compression = match video_opts.compression {
            Some(level) => {
                progress_callback(Progress::compressing(level));
                match compress_video(output, level, ffmpeg) {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        warn!("compression of {} failed, keeping the original: {}", output.display(), e);
                        None
                    }
                }
            }
            None => None,
        };

        progress_callback(Progress::complete(written as usize));
        Ok(VideoSummary {
            frames_written: written,
            window,
            grid,
            compression,
        })
    }

    /// Get a preset by name
    pub fn get_preset(&self, name: &str) -> Option<&Preset> {
        self.config.preset(name)
    }

    /// Conversion options for a preset, using the configured glyph directory
    pub fn options_from_preset(&self, preset_name: &str) -> Result<ConversionOptions> {
        let preset = self
            .get_preset(preset_name)
            .ok_or_else(|| anyhow!("Preset '{}' not found", preset_name))?;
        let glyph_dir = self
            .config
            .glyph_dir
            .clone()
            .unwrap_or_else(|| ConversionOptions::default().glyph_dir);
        Ok(ConversionOptions::from_preset(preset, glyph_dir))
    }
}

impl Default for AsciiConverter {
    fn default() -> Self {
        Self::new()
    }
}

fn open_source(input: &Path) -> error::Result<GrayImage> {
    image::open(input)
        .map(|img| img.to_luma8())
        .map_err(|e| GlyphTileError::SourceUnreadable {
            path: input.to_path_buf(),
            reason: e.to_string(),
        })
}

fn create_parent_dir(output: &Path) -> Result<()> {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).with_context(|| format!("creating output directory {}", dir.display()))
        }
        _ => Ok(()),
    }
}
