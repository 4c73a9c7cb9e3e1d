//! Error type shared by the glyph index, glyph cache, tiling engine and video plumbing.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlyphTileError {
    /// A caller-supplied parameter failed its precondition check.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unsupported file extension for {path}: expected one of {expected}")]
    UnsupportedExtension { path: PathBuf, expected: String },

    #[error("could not read source {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("could not read glyph directory {path}: {source}")]
    GlyphDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A glyph file could not be decoded while building the brightness index.
    /// Never returned as an `Err`; collected in [`crate::IndexBuild::skipped`].
    #[error("skipped glyph {path}: {reason}")]
    GlyphLoadSkipped { path: PathBuf, reason: String },

    /// A glyph named by the brightness index could not be loaded for the cache.
    #[error("glyph `{key}` is in the index but {path} could not be loaded: {reason}")]
    GlyphSetInconsistent {
        key: String,
        path: PathBuf,
        reason: String,
    },

    #[error("no readable glyph images in {dir}")]
    EmptyGlyphSet { dir: PathBuf },

    #[error("glyph `{key}` is {found:?}, expected {expected:?} like the rest of the set")]
    GlyphSizeMismatch {
        key: String,
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("image width {width} is smaller than the requested {columns} columns")]
    ImageTooNarrow { width: u32, columns: u32 },

    #[error("glyph cache holds {cached:?} tiles but the grid needs {grid:?}")]
    CacheSizeMismatch { cached: (u32, u32), grid: (u32, u32) },

    #[error("{tool} failed: {reason}")]
    Ffmpeg { tool: &'static str, reason: String },

    #[error("font error: {0}")]
    Font(String),

    #[error("character code {0} is outside the ASCII range 0-127")]
    InvalidCharCode(u32),

    #[error("character {0:?} is not ASCII")]
    NonAsciiChar(char),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GlyphTileError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn ffmpeg(tool: &'static str, reason: impl Into<String>) -> Self {
        Self::Ffmpeg {
            tool,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GlyphTileError>;
