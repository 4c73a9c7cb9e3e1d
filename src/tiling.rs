//! Tile grid and compositing engine.
//!
//! The source image is cut into a grid of tiles. Each tile is replaced by the
//! cached glyph whose brightness score is nearest to the tile's mean intensity.
//! Tiles on the right and bottom edges can be smaller than the rest; they receive
//! the top-left part of their glyph so the output keeps the exact input size.

use image::GrayImage;
use log::debug;
use rayon::prelude::*;

use crate::brightness::{BrightnessIndex, GlyphEntry};
use crate::cache::GlyphCache;
use crate::error::{GlyphTileError, Result};

/// Partition of a `width`×`height` image into glyph-sized tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub rows: u32,
    /// At least the requested column count. When the width does not divide
    /// evenly the remainder is covered by extra columns, the last one partial.
    pub cols: u32,
}

/// One cell of a [`TileGrid`] in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub row: u32,
    pub col: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileGrid {
    /// `tile_width = width / columns`, `tile_height = round(tile_width / aspect_ratio)`,
    /// with enough rows and columns to cover every pixel.
    pub fn new(width: u32, height: u32, columns: u32, aspect_ratio: f64) -> Result<Self> {
        if columns == 0 {
            return Err(GlyphTileError::invalid("columns", "must be at least 1"));
        }
        if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
            return Err(GlyphTileError::invalid("aspect_ratio", format!("must be positive, got {}", aspect_ratio)));
        }
        if width == 0 || height == 0 {
            return Err(GlyphTileError::invalid("image", format!("{}x{} has a zero side", width, height)));
        }

        let tile_width = width / columns;
        if tile_width == 0 {
            return Err(GlyphTileError::ImageTooNarrow { width, columns });
        }
        let tile_height = ((tile_width as f64 / aspect_ratio).round() as u32).max(1);

        Ok(Self {
            width,
            height,
            tile_width,
            tile_height,
            rows: height.div_ceil(tile_height),
            cols: width.div_ceil(tile_width),
        })
    }

    pub fn tile(&self, row: u32, col: u32) -> Tile {
        let x = col * self.tile_width;
        let y = row * self.tile_height;
        Tile {
            row,
            col,
            x,
            y,
            width: x.saturating_add(self.tile_width).min(self.width) - x,
            height: y.saturating_add(self.tile_height).min(self.height) - y,
        }
    }

    /// All tiles, row-major.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| self.tile(row, col)))
    }

    pub fn tile_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl Tile {
    /// True for edge tiles cut short by the image border.
    pub fn is_partial(&self, grid: &TileGrid) -> bool {
        self.width < grid.tile_width || self.height < grid.tile_height
    }
}

/// Mean intensity of the pixels covered by `tile`.
pub fn tile_mean(img: &GrayImage, tile: &Tile) -> f64 {
    let stride = img.width() as usize;
    let raw = img.as_raw();
    let mut sum: u64 = 0;
    for y in tile.y..tile.y + tile.height {
        let start = y as usize * stride + tile.x as usize;
        sum += raw[start..start + tile.width as usize].iter().map(|&p| p as u64).sum::<u64>();
    }
    sum as f64 / (tile.width as u64 * tile.height as u64) as f64
}

/// Composites glyphs from a cache into full-size output images.
pub struct Renderer<'a> {
    index: &'a BrightnessIndex,
    cache: &'a GlyphCache,
}

impl<'a> Renderer<'a> {
    pub fn new(index: &'a BrightnessIndex, cache: &'a GlyphCache) -> Self {
        Self { index, cache }
    }

    /// Grid for an image of the given size using the glyphs' aspect ratio.
    pub fn grid_for(&self, width: u32, height: u32, columns: u32) -> Result<TileGrid> {
        TileGrid::new(width, height, columns, self.index.aspect_ratio())
    }

    pub fn match_tile(&self, source: &GrayImage, tile: &Tile) -> &'a GlyphEntry {
        self.index.nearest(tile_mean(source, tile))
    }

    /// Keys of the matched glyphs, row-major.
    pub fn match_grid(&self, source: &GrayImage, grid: &TileGrid) -> Vec<&'a str> {
        grid.tiles().map(|tile| self.match_tile(source, &tile).key.as_str()).collect()
    }

    /// Render `source` as glyphs. The output has exactly the source's size.
    pub fn render(&self, source: &GrayImage, grid: &TileGrid) -> Result<GrayImage> {
        if source.dimensions() != (grid.width, grid.height) {
            return Err(GlyphTileError::invalid(
                "grid",
                format!("grid is {}x{} but the image is {:?}", grid.width, grid.height, source.dimensions()),
            ));
        }
        let grid_tile = (grid.tile_width, grid.tile_height);
        if self.cache.tile_size() != grid_tile {
            return Err(GlyphTileError::CacheSizeMismatch {
                cached: self.cache.tile_size(),
                grid: grid_tile,
            });
        }

        let width = grid.width as usize;
        let band_len = width * grid.tile_height as usize;
        let mut canvas = vec![0u8; width * grid.height as usize];

        // One band per grid row; bands are disjoint slices of the canvas.
        canvas
            .par_chunks_mut(band_len)
            .enumerate()
            .try_for_each(|(row, band)| -> Result<()> {
                for col in 0..grid.cols {
                    let tile = grid.tile(row as u32, col);
                    let entry = self.match_tile(source, &tile);
                    let glyph = self.cache.get(&entry.key).ok_or_else(|| GlyphTileError::GlyphSetInconsistent {
                        key: entry.key.clone(),
                        path: entry.path.clone(),
                        reason: "not present in the glyph cache".to_string(),
                    })?;

                    let glyph_stride = glyph.width() as usize;
                    let glyph_raw = glyph.as_raw();
                    let w = tile.width as usize;
                    for dy in 0..tile.height as usize {
                        let dst = dy * width + tile.x as usize;
                        let src = dy * glyph_stride;
                        band[dst..dst + w].copy_from_slice(&glyph_raw[src..src + w]);
                    }
                }
                Ok(())
            })?;

        GrayImage::from_raw(grid.width, grid.height, canvas)
            .ok_or_else(|| GlyphTileError::invalid("canvas", "buffer does not match the grid size"))
    }
}

/// Render `source` with `columns` glyphs per row, using a cache built for this size.
pub fn render_image(source: &GrayImage, columns: u32, index: &BrightnessIndex, cache: &GlyphCache) -> Result<GrayImage> {
    let renderer = Renderer::new(index, cache);
    let grid = renderer.grid_for(source.width(), source.height(), columns)?;
    debug!(
        "grid {}x{} tiles of {}x{} px for {}x{} image",
        grid.cols, grid.rows, grid.tile_width, grid.tile_height, grid.width, grid.height
    );
    renderer.render(source, &grid)
}
