//! Glyph rasters pre-resized to one tile size.

use image::imageops::{self, FilterType};
use image::GrayImage;
use log::debug;
use std::collections::HashMap;

use crate::brightness::BrightnessIndex;
use crate::error::{GlyphTileError, Result};

/// Interpolation applied to every glyph when it is scaled to the tile size.
pub const GLYPH_FILTER: FilterType = FilterType::Triangle;

/// Every glyph of a [`BrightnessIndex`], resized once to `tile_width`×`tile_height`.
///
/// Read-only after construction, so it can be shared between threads rendering
/// different parts of a frame.
#[derive(Debug, Clone)]
pub struct GlyphCache {
    tiles: HashMap<String, GrayImage>,
    tile_width: u32,
    tile_height: u32,
}

impl GlyphCache {
    /// Load and resize each indexed glyph exactly once.
    ///
    /// The index and the glyph files are expected to describe the same set: a
    /// glyph that can no longer be read fails the whole build with
    /// [`GlyphTileError::GlyphSetInconsistent`].
    pub fn build(index: &BrightnessIndex, tile_width: u32, tile_height: u32) -> Result<Self> {
        if tile_width == 0 || tile_height == 0 {
            return Err(GlyphTileError::invalid(
                "tile_size",
                format!("{}x{} has a zero side", tile_width, tile_height),
            ));
        }

        let mut tiles = HashMap::with_capacity(index.len());
        for entry in index.entries() {
            let glyph = image::open(&entry.path)
                .map_err(|e| GlyphTileError::GlyphSetInconsistent {
                    key: entry.key.clone(),
                    path: entry.path.clone(),
                    reason: e.to_string(),
                })?
                .to_luma8();
            let resized = if glyph.dimensions() == (tile_width, tile_height) {
                glyph
            } else {
                imageops::resize(&glyph, tile_width, tile_height, GLYPH_FILTER)
            };
            tiles.insert(entry.key.clone(), resized);
        }

        debug!("cached {} glyphs at {}x{}", tiles.len(), tile_width, tile_height);
        Ok(Self {
            tiles,
            tile_width,
            tile_height,
        })
    }

    pub fn get(&self, key: &str) -> Option<&GrayImage> {
        self.tiles.get(key)
    }

    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
