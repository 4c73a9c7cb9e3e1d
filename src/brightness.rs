//! Glyph brightness index.
//!
//! Every glyph gets a score: the mean intensity of the glyph after morphological
//! erosion. Eroding first spreads thin strokes so the score tracks how much ink a
//! glyph carries instead of how much antialiasing it has, which spreads the scores
//! of a glyph set much more evenly over 0-255.

use image::{GrayImage, Luma};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{GlyphTileError, Result};

/// Extensions recognised as glyph images.
pub const GLYPH_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Square structuring element and repeat count for the erosion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErosionParams {
    pub kernel_size: u32,
    pub iterations: u32,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            iterations: 4,
        }
    }
}

impl ErosionParams {
    pub fn new(kernel_size: u32, iterations: u32) -> Self {
        Self { kernel_size, iterations }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kernel_size == 0 {
            return Err(GlyphTileError::invalid("kernel_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Grayscale erosion with a `kernel_size`×`kernel_size` square, applied `iterations` times.
///
/// Each output pixel is the minimum over the window anchored at `kernel_size / 2`.
/// Windows are clipped at the image border, so pixels outside the image never
/// darken the result.
pub fn erode(img: &GrayImage, kernel_size: u32, iterations: u32) -> GrayImage {
    let mut out = img.clone();
    if kernel_size <= 1 || iterations == 0 {
        return out;
    }

    let (w, h) = img.dimensions();
    let before = kernel_size / 2;
    let after = kernel_size - 1 - before;
    let mut scratch = GrayImage::new(w, h);

    // The square min filter is separable: rows first, then columns.
    for _ in 0..iterations {
        for y in 0..h {
            for x in 0..w {
                let lo = x.saturating_sub(before);
                let hi = (x + after).min(w - 1);
                let m = (lo..=hi).map(|sx| out.get_pixel(sx, y)[0]).min().unwrap_or(u8::MAX);
                scratch.put_pixel(x, y, Luma([m]));
            }
        }
        for y in 0..h {
            let lo = y.saturating_sub(before);
            let hi = (y + after).min(h - 1);
            for x in 0..w {
                let m = (lo..=hi).map(|sy| scratch.get_pixel(x, sy)[0]).min().unwrap_or(u8::MAX);
                out.put_pixel(x, y, Luma([m]));
            }
        }
    }
    out
}

/// Mean intensity of all pixels, 0.0 for an empty image.
pub fn mean_intensity(img: &GrayImage) -> f64 {
    let n = img.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let sum: u64 = img.as_raw().iter().map(|&p| p as u64).sum();
    sum as f64 / n as f64
}

/// Brightness score of one glyph raster.
pub fn brightness_score(img: &GrayImage, params: ErosionParams) -> f64 {
    mean_intensity(&erode(img, params.kernel_size, params.iterations))
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlyphEntry {
    /// File name of the glyph; the key used by the cache and the tiling engine.
    pub key: String,
    pub path: PathBuf,
    pub score: f64,
}

/// Glyph entries sorted ascending by brightness score.
///
/// Never empty. Entries with equal scores keep the order they were enumerated in.
#[derive(Debug, Clone)]
pub struct BrightnessIndex {
    entries: Vec<GlyphEntry>,
    glyph_size: (u32, u32),
}

/// Result of scanning a glyph directory.
#[derive(Debug)]
pub struct IndexBuild {
    pub index: BrightnessIndex,
    /// One [`GlyphTileError::GlyphLoadSkipped`] per file that could not be decoded.
    pub skipped: Vec<GlyphTileError>,
}

pub(crate) fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

impl BrightnessIndex {
    /// Score every glyph image in `dir`.
    ///
    /// Files are visited in file-name order, which fixes the tie-break order of
    /// equal scores. Files that fail to decode are skipped and reported in
    /// [`IndexBuild::skipped`]; a readable glyph whose size differs from the first
    /// one is an error.
    pub fn from_dir(dir: &Path, params: ErosionParams) -> Result<IndexBuild> {
        params.validate()?;
        fs::read_dir(dir).map_err(|source| GlyphTileError::GlyphDirUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;

        let paths: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && has_extension(p, GLYPH_EXTENSIONS))
            .collect();

        let mut entries = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();
        let mut glyph_size: Option<(u32, u32)> = None;

        for path in paths {
            let key = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    warn!("skipping glyph with non UTF-8 name: {}", path.display());
                    skipped.push(GlyphTileError::GlyphLoadSkipped {
                        path,
                        reason: "file name is not valid UTF-8".to_string(),
                    });
                    continue;
                }
            };

            let img = match image::open(&path) {
                Ok(img) => img.to_luma8(),
                Err(e) => {
                    warn!("skipping unreadable glyph {}: {}", path.display(), e);
                    skipped.push(GlyphTileError::GlyphLoadSkipped {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let size = img.dimensions();
            match glyph_size {
                None => glyph_size = Some(size),
                Some(expected) if expected != size => {
                    return Err(GlyphTileError::GlyphSizeMismatch { key, expected, found: size });
                }
                Some(_) => {}
            }

            let score = brightness_score(&img, params);
            debug!("glyph {} scored {:.3}", key, score);
            entries.push(GlyphEntry { key, path, score });
        }

        let glyph_size = glyph_size.ok_or_else(|| GlyphTileError::EmptyGlyphSet { dir: dir.to_path_buf() })?;
        let index = Self::sorted(entries, glyph_size);
        debug!("indexed {} glyphs from {} ({} skipped)", index.len(), dir.display(), skipped.len());
        Ok(IndexBuild { index, skipped })
    }

    /// Build an index from already scored entries, in enumeration order.
    pub fn from_entries(entries: Vec<GlyphEntry>, glyph_size: (u32, u32)) -> Result<Self> {
        if entries.is_empty() {
            return Err(GlyphTileError::EmptyGlyphSet { dir: PathBuf::new() });
        }
        if glyph_size.0 == 0 || glyph_size.1 == 0 {
            return Err(GlyphTileError::invalid("glyph_size", format!("{:?} has a zero side", glyph_size)));
        }
        if let Some(bad) = entries.iter().find(|e| !e.score.is_finite() || e.score < 0.0) {
            return Err(GlyphTileError::invalid("score", format!("glyph `{}` has score {}", bad.key, bad.score)));
        }
        Ok(Self::sorted(entries, glyph_size))
    }

    fn sorted(mut entries: Vec<GlyphEntry>, glyph_size: (u32, u32)) -> Self {
        // sort_by is stable
        entries.sort_by(|a, b| a.score.total_cmp(&b.score));
        Self { entries, glyph_size }
    }

    pub fn entries(&self) -> &[GlyphEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Width and height of the source glyph rasters.
    pub fn glyph_size(&self) -> (u32, u32) {
        self.glyph_size
    }

    /// Glyph width divided by glyph height.
    pub fn aspect_ratio(&self) -> f64 {
        self.glyph_size.0 as f64 / self.glyph_size.1 as f64
    }

    pub fn get(&self, key: &str) -> Option<&GlyphEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.score)
    }

    /// Entry whose score is closest to `mean`.
    ///
    /// Among equally close entries the first one in ascending-score order wins,
    /// the same entry a front-to-back scan keeping the first strict minimum picks.
    pub fn nearest(&self, mean: f64) -> &GlyphEntry {
        let e = &self.entries;
        let i = e.partition_point(|g| g.score < mean);
        if i == 0 {
            return &e[0];
        }
        let below = &e[i - 1];
        if i == e.len() || mean - below.score <= e[i].score - mean {
            // Earlier duplicates of `below.score` are equally close and come first.
            let first = e.partition_point(|g| g.score < below.score);
            return &e[first];
        }
        &e[i]
    }

    /// Front-to-back reference scan for [`BrightnessIndex::nearest`].
    pub fn nearest_linear(&self, mean: f64) -> &GlyphEntry {
        let mut best = &self.entries[0];
        let mut best_dist = (best.score - mean).abs();
        for entry in &self.entries[1..] {
            let dist = (entry.score - mean).abs();
            if dist < best_dist {
                best = entry;
                best_dist = dist;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, score: f64) -> GlyphEntry {
        GlyphEntry {
            key: key.to_string(),
            path: PathBuf::from(key),
            score,
        }
    }

    fn index(scores: &[(&str, f64)]) -> BrightnessIndex {
        BrightnessIndex::from_entries(scores.iter().map(|(k, s)| entry(k, *s)).collect(), (8, 16)).unwrap()
    }

    #[test]
    fn zero_iterations_or_unit_kernel_is_identity() {
        let img = GrayImage::from_fn(5, 4, |x, y| Luma([(x * 40 + y * 7) as u8]));
        assert_eq!(erode(&img, 3, 0), img);
        assert_eq!(erode(&img, 1, 5), img);
    }

    #[test]
    fn single_dark_pixel_grows_into_kernel_square() {
        let mut img = GrayImage::from_pixel(7, 7, Luma([255]));
        img.put_pixel(3, 3, Luma([0]));
        let eroded = erode(&img, 3, 1);
        for y in 0..7 {
            for x in 0..7 {
                let dark = (2..=4).contains(&x) && (2..=4).contains(&y);
                assert_eq!(eroded.get_pixel(x, y)[0], if dark { 0 } else { 255 }, "pixel ({}, {})", x, y);
            }
        }
        let twice = erode(&img, 3, 2);
        assert_eq!(twice.pixels().filter(|p| p[0] == 0).count(), 25);
    }

    #[test]
    fn even_kernel_anchors_at_half_size() {
        // kernel 2: window is [x - 1, x], so darkness spreads right and down only
        let mut img = GrayImage::from_pixel(4, 4, Luma([200]));
        img.put_pixel(1, 1, Luma([10]));
        let eroded = erode(&img, 2, 1);
        assert_eq!(eroded.get_pixel(1, 1)[0], 10);
        assert_eq!(eroded.get_pixel(2, 2)[0], 10);
        assert_eq!(eroded.get_pixel(0, 0)[0], 200);
        assert_eq!(eroded.get_pixel(0, 1)[0], 200);
    }

    #[test]
    fn border_does_not_darken() {
        let img = GrayImage::from_pixel(3, 3, Luma([180]));
        assert_eq!(erode(&img, 5, 3), img);
    }

    #[test]
    fn erosion_lowers_score_of_thin_strokes() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([255]));
        for y in 0..9 {
            img.put_pixel(4, y, Luma([0]));
        }
        let raw = mean_intensity(&img);
        let eroded = brightness_score(&img, ErosionParams::new(3, 1));
        assert!(eroded < raw);
    }

    #[test]
    fn zero_kernel_is_rejected() {
        assert!(matches!(
            ErosionParams::new(0, 4).validate(),
            Err(GlyphTileError::InvalidParameter { name: "kernel_size", .. })
        ));
    }

    #[test]
    fn entries_are_sorted_with_stable_ties() {
        let idx = index(&[("c", 30.0), ("a", 10.0), ("b", 30.0), ("d", 5.0)]);
        let keys: Vec<&str> = idx.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["d", "a", "c", "b"]);
    }

    #[test]
    fn equal_scores_resolve_to_first_in_order() {
        let idx = index(&[("first", 100.0), ("second", 100.0)]);
        assert_eq!(idx.nearest(100.0).key, "first");
        assert_eq!(idx.nearest(0.0).key, "first");
        assert_eq!(idx.nearest(255.0).key, "first");
    }

    #[test]
    fn equidistant_neighbours_pick_the_darker() {
        let idx = index(&[("dark", 90.0), ("light", 110.0)]);
        assert_eq!(idx.nearest(100.0).key, "dark");
        assert_eq!(idx.nearest(100.5).key, "light");
    }

    #[test]
    fn binary_search_agrees_with_scan() {
        let idx = index(&[
            ("a", 0.0),
            ("b", 12.5),
            ("c", 12.5),
            ("d", 40.0),
            ("e", 41.0),
            ("f", 41.0),
            ("g", 128.0),
            ("h", 200.0),
            ("i", 255.0),
        ]);
        let mut mean = -5.0;
        while mean <= 260.0 {
            assert_eq!(idx.nearest(mean).key, idx.nearest_linear(mean).key, "mean {}", mean);
            mean += 0.25;
        }
    }

    #[test]
    fn aspect_ratio_is_width_over_height() {
        let idx = index(&[("a", 1.0)]);
        assert_eq!(idx.aspect_ratio(), 0.5);
    }

    #[test]
    fn empty_and_negative_entries_are_rejected() {
        assert!(matches!(
            BrightnessIndex::from_entries(vec![], (8, 16)),
            Err(GlyphTileError::EmptyGlyphSet { .. })
        ));
        assert!(BrightnessIndex::from_entries(vec![entry("x", -1.0)], (8, 16)).is_err());
    }
}
