//! Glyph set fixtures synthesised at test time.

#![allow(dead_code)]

use image::{GrayImage, Luma};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Glyph raster filled with one intensity; its brightness score is that intensity
/// for any erosion.
pub fn flat_glyph(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
}

pub fn write_glyph(dir: &Path, name: &str, img: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// Temporary glyph directory holding one flat 8x16 glyph per `(name, value)`.
pub fn flat_glyph_set(glyphs: &[(&str, u8)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, value) in glyphs {
        write_glyph(dir.path(), name, &flat_glyph(8, 16, *value));
    }
    dir
}

pub fn write_garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"definitely not an image").unwrap();
    path
}
