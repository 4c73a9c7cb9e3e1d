//! Example: Render an image with glyphs using glyphtile as a library
//! Run with: cargo run --example simple_image -- <font.ttf> <image>

use glyphtile::glyphs::{generate_glyph_images, PRINTABLE_END, PRINTABLE_START};
use glyphtile::stats::BrightnessStats;
use glyphtile::{AsciiConverter, ConversionOptions};
use std::path::{Path, PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let (Some(font), Some(input)) = (args.next(), args.next()) else {
        println!("usage: simple_image <font.ttf> <image>");
        return Ok(());
    };

    // Example 1: Build a glyph set from a font
    let glyph_dir = PathBuf::from("demo_glyphs");
    let written = generate_glyph_images(Path::new(&font), 20.0, PRINTABLE_START..=PRINTABLE_END, &glyph_dir)?;
    println!("✓ Wrote {} glyphs to {}", written.len(), glyph_dir.display());

    // Example 2: Check how well the set spreads over the brightness range
    let converter = AsciiConverter::new();
    let options = ConversionOptions::default()
        .with_columns(100)
        .with_glyph_dir(&glyph_dir);
    let index = converter.load_index(&options)?;
    let stats = BrightnessStats::from_index(&index, 8)?;
    println!(
        "✓ Scores {:.1}..{:.1}, uniformity {:.3}",
        stats.min,
        stats.max,
        stats.histogram.uniformity()
    );

    // Example 3: Render the image
    let output = Path::new("example_output.png");
    let grid = converter.convert_image(Path::new(&input), output, &options)?;
    println!("✓ {} x {} glyphs saved to {}", grid.cols, grid.rows, output.display());

    // Example 4: Using presets
    let small_options = converter.options_from_preset("small")?.with_glyph_dir(&glyph_dir);
    let canvas = converter.image_to_canvas(Path::new(&input), &small_options)?;
    println!("✓ Small preset canvas is {}x{}", canvas.width(), canvas.height());

    Ok(())
}
