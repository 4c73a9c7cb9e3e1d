//! Statistics over a glyph set.
//!
//! A good glyph set spreads its brightness scores evenly over the intensity range
//! so that every tile brightness has a close match. [`BrightnessStats`] reports
//! how close a set is to that.

use image::GrayImage;
use serde::Serialize;

use crate::brightness::{erode, BrightnessIndex, ErosionParams};
use crate::error::{GlyphTileError, Result};

/// Fraction of non-zero pixels of a glyph after erosion.
pub fn coverage(img: &GrayImage, params: ErosionParams) -> f64 {
    let eroded = erode(img, params.kernel_size, params.iterations);
    let total = eroded.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    eroded.as_raw().iter().filter(|&&p| p != 0).count() as f64 / total as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Equal-width bins spanning `[min, max]` of `values`.
    pub fn new(values: &[f64], bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(GlyphTileError::invalid("bins", "must be at least 1"));
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut counts = vec![0usize; bins];
        if values.is_empty() {
            return Ok(Self { min: 0.0, max: 0.0, counts });
        }

        let span = max - min;
        for &v in values {
            let bin = if span > 0.0 {
                (((v - min) / span) * bins as f64).floor() as usize
            } else {
                0
            };
            counts[bin.min(bins - 1)] += 1;
        }
        Ok(Self { min, max, counts })
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// 1.0 for a perfectly flat histogram, 0.0 when every value sits in one bin.
    ///
    /// One minus the chi-square distance from the flat histogram, normalised by
    /// its largest possible value.
    pub fn uniformity(&self) -> f64 {
        let bins = self.counts.len();
        let n = self.total();
        if bins < 2 || n == 0 {
            return 1.0;
        }
        let expected = n as f64 / bins as f64;
        let chi2: f64 = self
            .counts
            .iter()
            .map(|&c| {
                let d = c as f64 - expected;
                d * d / expected
            })
            .sum();
        1.0 - chi2 / (n as f64 * (bins - 1) as f64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BrightnessStats {
    pub glyphs: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub histogram: Histogram,
}

impl BrightnessStats {
    pub fn from_index(index: &BrightnessIndex, bins: usize) -> Result<Self> {
        let scores: Vec<f64> = index.scores().collect();
        let histogram = Histogram::new(&scores, bins)?;
        let mean = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
        Ok(Self {
            glyphs: scores.len(),
            min: histogram.min,
            max: histogram.max,
            mean,
            histogram,
        })
    }
}
