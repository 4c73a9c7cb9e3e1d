//! Glyph naming and glyph-set generation.
//!
//! A glyph set is a directory holding one image per printable character, all of
//! the same size. Files are named after the character code so a set can be traced
//! back to the symbols it was rendered from; the rest of the crate treats the
//! file names as opaque keys.

use ab_glyph::{point, Font, FontVec, PxScale};
use image::{GrayImage, Luma};
use log::{debug, info};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::error::{GlyphTileError, Result};

/// First printable ASCII code (space).
pub const PRINTABLE_START: u32 = 32;
/// Last printable ASCII code (`~`).
pub const PRINTABLE_END: u32 = 126;

/// Characters that cannot appear in a file name on common filesystems.
const UNSAFE_FILE_CHARS: &str = "<>:\"/\\|?*";

/// Convert an ASCII code (0-127) to its character.
pub fn ascii_char(code: u32) -> Result<char> {
    if code > 127 {
        return Err(GlyphTileError::InvalidCharCode(code));
    }
    char::from_u32(code).ok_or(GlyphTileError::InvalidCharCode(code))
}

/// Convert an ASCII character to its code (0-127).
pub fn ascii_code(c: char) -> Result<u32> {
    if !c.is_ascii() {
        return Err(GlyphTileError::NonAsciiChar(c));
    }
    Ok(c as u32)
}

/// File name used for the glyph of `code`, e.g. `ascii_065_A.png`.
pub fn glyph_file_name(code: u32) -> Result<String> {
    let c = ascii_char(code)?;
    Ok(if c == ' ' {
        format!("ascii_{:03}_space.png", code)
    } else if UNSAFE_FILE_CHARS.contains(c) || c.is_ascii_control() {
        format!("ascii_{:03}.png", code)
    } else {
        format!("ascii_{:03}_{}.png", code, c)
    })
}

/// Recover the character code from a glyph file name produced by [`glyph_file_name`].
pub fn parse_glyph_code(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix("ascii_")?;
    let digits = rest.get(..3)?;
    let code: u32 = digits.parse().ok()?;
    (code <= 127).then_some(code)
}

/// Offset that centers an extent of `inner` pixels inside `outer` pixels.
/// Negative when the inner extent overflows the cell.
pub fn centered_offset(outer: u32, inner: u32) -> i32 {
    (outer as i32 - inner as i32) / 2
}

/// Renders printable characters of one font into equally sized glyph cells.
pub struct GlyphRenderer {
    font: FontVec,
    scale: PxScale,
    cell: (u32, u32),
}

impl GlyphRenderer {
    /// Load a TrueType/OpenType font. The cell size is taken from the ink bounds
    /// of `W`, the widest character in monospace fonts.
    pub fn from_file(font_path: &Path, font_size: f32) -> Result<Self> {
        if !(font_size > 0.0) {
            return Err(GlyphTileError::invalid("font_size", format!("must be positive, got {}", font_size)));
        }
        let data = fs::read(font_path).map_err(|e| GlyphTileError::SourceUnreadable {
            path: font_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let font = FontVec::try_from_vec(data).map_err(|e| GlyphTileError::Font(format!("{}: {}", font_path.display(), e)))?;
        let scale = PxScale::from(font_size);

        let w = font.glyph_id('W').with_scale_and_position(scale, point(0.0, 0.0));
        let cell = match font.outline_glyph(w) {
            Some(outlined) => {
                let bounds = outlined.px_bounds();
                (bounds.width().ceil().max(1.0) as u32, bounds.height().ceil().max(1.0) as u32)
            }
            None => return Err(GlyphTileError::Font(format!("{} has no outline for 'W'", font_path.display()))),
        };
        debug!("glyph cell size {}x{} at {}px", cell.0, cell.1, font_size);

        Ok(Self { font, scale, cell })
    }

    pub fn cell_size(&self) -> (u32, u32) {
        self.cell
    }

    /// Draw `c` in black, centered on a white cell.
    pub fn render(&self, c: char) -> GrayImage {
        let (cw, ch) = self.cell;
        let mut img = GrayImage::from_pixel(cw, ch, Luma([255]));

        let glyph = self.font.glyph_id(c).with_scale_and_position(self.scale, point(0.0, 0.0));
        let Some(outlined) = self.font.outline_glyph(glyph) else {
            // whitespace
            return img;
        };

        let bounds = outlined.px_bounds();
        let x0 = centered_offset(cw, bounds.width().ceil() as u32);
        let y0 = centered_offset(ch, bounds.height().ceil() as u32);

        outlined.draw(|x, y, coverage| {
            let px = x0 + x as i32;
            let py = y0 + y as i32;
            if px < 0 || py < 0 || px >= cw as i32 || py >= ch as i32 {
                return;
            }
            let ink = (255.0 * (1.0 - coverage.clamp(0.0, 1.0))).round() as u8;
            let pixel = img.get_pixel_mut(px as u32, py as u32);
            pixel[0] = pixel[0].min(ink);
        });

        img
    }
}

/// Render one glyph image per code in `codes` into `out_dir`.
///
/// Returns the written paths in code order.
pub fn generate_glyph_images(font_path: &Path, font_size: f32, codes: RangeInclusive<u32>, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let renderer = GlyphRenderer::from_file(font_path, font_size)?;
    fs::create_dir_all(out_dir)?;

    let (cw, ch) = renderer.cell_size();
    info!("rendering glyphs {:?} from {} at {}x{}", codes, font_path.display(), cw, ch);

    let mut written = Vec::with_capacity(codes.clone().count());
    for code in codes {
        let c = ascii_char(code)?;
        let path = out_dir.join(glyph_file_name(code)?);
        renderer.render(c).save(&path)?;
        debug!("glyph {} ({:?}) -> {}", code, c, path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_and_code_round_trip_over_printable_range() {
        for n in PRINTABLE_START..=PRINTABLE_END {
            assert_eq!(ascii_code(ascii_char(n).unwrap()).unwrap(), n);
        }
    }

    #[test]
    fn known_codes() {
        assert_eq!(ascii_char(65).unwrap(), 'A');
        assert_eq!(ascii_char(97).unwrap(), 'a');
        assert_eq!(ascii_char(48).unwrap(), '0');
        assert_eq!(ascii_char(32).unwrap(), ' ');
        assert_eq!(ascii_char(126).unwrap(), '~');
        assert_eq!(ascii_code('~').unwrap(), 126);
    }

    #[test]
    fn out_of_range_code_is_rejected() {
        assert!(matches!(ascii_char(200), Err(GlyphTileError::InvalidCharCode(200))));
    }

    #[test]
    fn non_ascii_char_is_rejected() {
        assert!(matches!(ascii_code('€'), Err(GlyphTileError::NonAsciiChar('€'))));
    }

    #[test]
    fn file_names() {
        assert_eq!(glyph_file_name(32).unwrap(), "ascii_032_space.png");
        assert_eq!(glyph_file_name(65).unwrap(), "ascii_065_A.png");
        assert_eq!(glyph_file_name(47).unwrap(), "ascii_047.png");
        assert_eq!(glyph_file_name(63).unwrap(), "ascii_063.png");
    }

    #[test]
    fn file_names_parse_back_to_codes() {
        for n in PRINTABLE_START..=PRINTABLE_END {
            assert_eq!(parse_glyph_code(&glyph_file_name(n).unwrap()), Some(n));
        }
        assert_eq!(parse_glyph_code("glyph.png"), None);
        assert_eq!(parse_glyph_code("ascii_9x.png"), None);
    }

    #[test]
    fn centering() {
        assert_eq!(centered_offset(20, 10), 5);
        assert_eq!(centered_offset(10, 10), 0);
        assert_eq!(centered_offset(10, 14), -2);
    }

    #[test]
    fn missing_font_is_source_unreadable() {
        let err = GlyphRenderer::from_file(Path::new("/nonexistent/font.ttf"), 32.0).err().unwrap();
        assert!(matches!(err, GlyphTileError::SourceUnreadable { .. }));
    }
}
