//! End-to-end image conversion and parameter checking through `AsciiConverter`.

mod common;

use common::flat_glyph_set;
use glyphtile::{
    AppConfig, AsciiConverter, ConversionOptions, ErosionParams, GlyphTileError, VideoOptions,
};
use image::{GrayImage, Luma};
use std::fs;
use std::path::Path;

fn domain_error(err: &anyhow::Error) -> &GlyphTileError {
    err.downcast_ref::<GlyphTileError>()
        .unwrap_or_else(|| panic!("expected a GlyphTileError, got {:#}", err))
}

#[test_log::test]
fn converts_image_to_same_size_output() {
    let glyphs = flat_glyph_set(&[("dark.png", 30), ("mid.png", 128), ("light.png", 220)]);
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("gradient.png");
    GrayImage::from_fn(97, 41, |x, _| Luma([(x * 255 / 96) as u8]))
        .save(&input)
        .unwrap();
    let output = work.path().join("out").join("gradient_ascii.png");

    let opts = ConversionOptions::default()
        .with_columns(12)
        .with_glyph_dir(glyphs.path());
    let grid = AsciiConverter::new().convert_image(&input, &output, &opts).unwrap();

    assert_eq!(grid.tile_width, 97 / 12);
    assert!(grid.cols >= 12);
    let rendered = image::open(&output).unwrap().to_luma8();
    assert_eq!(rendered.dimensions(), (97, 41));
    // only glyph intensities appear in the output
    assert!(rendered.pixels().all(|p| [30, 128, 220].contains(&p[0])));
}

#[test]
fn image_to_canvas_writes_nothing() {
    let glyphs = flat_glyph_set(&[("a.png", 0), ("b.png", 255)]);
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("in.jpg");
    image::DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([250])))
        .save(&input)
        .unwrap();

    let opts = ConversionOptions::default().with_columns(5).with_glyph_dir(glyphs.path());
    let canvas = AsciiConverter::new().image_to_canvas(&input, &opts).unwrap();
    assert_eq!(canvas.dimensions(), (40, 40));
    assert!(canvas.pixels().all(|p| p[0] == 255));
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 1);
}

#[test]
fn invalid_parameters_fail_before_any_io() {
    let converter = AsciiConverter::new();
    // none of these paths exist; validation must fail first
    let nowhere = Path::new("/nonexistent/dir");
    let opts = ConversionOptions::default().with_glyph_dir(nowhere);

    let err = converter
        .convert_image(&nowhere.join("a.png"), &nowhere.join("b.png"), &opts.clone().with_columns(0))
        .unwrap_err();
    assert!(matches!(domain_error(&err), GlyphTileError::InvalidParameter { name: "columns", .. }));

    let err = converter
        .convert_image(
            &nowhere.join("a.png"),
            &nowhere.join("b.png"),
            &opts.clone().with_erosion(ErosionParams::new(0, 2)),
        )
        .unwrap_err();
    assert!(matches!(domain_error(&err), GlyphTileError::InvalidParameter { name: "kernel_size", .. }));

    let err = converter
        .convert_image(&nowhere.join("a.gif"), &nowhere.join("b.png"), &opts)
        .unwrap_err();
    assert!(matches!(domain_error(&err), GlyphTileError::UnsupportedExtension { .. }));

    let err = converter
        .convert_image(&nowhere.join("a.png"), &nowhere.join("b.bmp"), &opts)
        .unwrap_err();
    assert!(matches!(domain_error(&err), GlyphTileError::UnsupportedExtension { .. }));

    let video = |vopts: VideoOptions, input: &str, output: &str| {
        converter
            .convert_video(&nowhere.join(input), &nowhere.join(output), &vopts, &opts)
            .unwrap_err()
    };
    let err = video(VideoOptions::default().with_speed_multiplier(0.5), "a.mp4", "b.mp4");
    assert!(matches!(
        domain_error(&err),
        GlyphTileError::InvalidParameter { name: "speed_multiplier", .. }
    ));
    let err = video(VideoOptions::default().with_window(5.0, Some(2.0)), "a.mp4", "b.mp4");
    assert!(matches!(domain_error(&err), GlyphTileError::InvalidParameter { name: "end", .. }));
    let err = video(VideoOptions::default(), "a.webm", "b.mp4");
    assert!(matches!(domain_error(&err), GlyphTileError::UnsupportedExtension { .. }));
    let err = video(VideoOptions::default(), "a.mov", "b.mkv");
    assert!(matches!(domain_error(&err), GlyphTileError::UnsupportedExtension { .. }));
    let err = video(VideoOptions::default(), "a.mov", "b.avi");
    assert!(matches!(domain_error(&err), GlyphTileError::SourceUnreadable { .. }));
}

#[test]
fn unreadable_source_image() {
    let glyphs = flat_glyph_set(&[("a.png", 0)]);
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("broken.png");
    fs::write(&input, b"garbage").unwrap();
    let opts = ConversionOptions::default().with_columns(4).with_glyph_dir(glyphs.path());

    let err = AsciiConverter::new()
        .convert_image(&input, &work.path().join("out.png"), &opts)
        .unwrap_err();
    assert!(matches!(domain_error(&err), GlyphTileError::SourceUnreadable { .. }));
    assert!(!work.path().join("out.png").exists());
}

#[test]
fn image_narrower_than_column_count() {
    let glyphs = flat_glyph_set(&[("a.png", 0)]);
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("tiny.png");
    GrayImage::from_pixel(5, 5, Luma([9])).save(&input).unwrap();
    let opts = ConversionOptions::default().with_columns(10).with_glyph_dir(glyphs.path());

    let err = AsciiConverter::new()
        .convert_image(&input, &work.path().join("out.png"), &opts)
        .unwrap_err();
    assert!(matches!(
        domain_error(&err),
        GlyphTileError::ImageTooNarrow { width: 5, columns: 10 }
    ));
}

#[test]
fn converter_from_toml_and_json_config() {
    let work = tempfile::tempdir().unwrap();
    let toml_path = work.path().join("glyphtile.toml");
    fs::write(
        &toml_path,
        "default_preset = \"tiny\"\nglyph_dir = \"my_glyphs\"\n\n[presets.tiny]\ncolumns = 16\niterations = 1\n",
    )
    .unwrap();
    let converter = AsciiConverter::from_config_file(&toml_path).unwrap();
    let opts = converter.options_from_preset("tiny").unwrap();
    assert_eq!(opts.columns, 16);
    assert_eq!(opts.erosion, ErosionParams::new(3, 1));
    assert_eq!(opts.glyph_dir, Path::new("my_glyphs"));

    let json_path = work.path().join("glyphtile.json");
    fs::write(&json_path, serde_json::to_string(&AppConfig::default()).unwrap()).unwrap();
    let converter = AsciiConverter::from_config_file(&json_path).unwrap();
    assert_eq!(converter.options_from_preset("default").unwrap().columns, 200);

    fs::write(&json_path, r#"{"presets": {"default": {"columns": 0}}}"#).unwrap();
    assert!(AsciiConverter::from_config_file(&json_path).is_err());
}

#[test]
fn packaged_examples_are_not_excluded() {
    let manifest: toml::Value =
        toml::from_str(&fs::read_to_string(Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml")).unwrap())
            .unwrap();
    let excluded: Vec<&str> = manifest["package"]["exclude"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    let examples = manifest["example"].as_array().unwrap();
    assert!(!examples.is_empty());
    for example in examples {
        let path = example["path"].as_str().unwrap();
        assert!(Path::new(env!("CARGO_MANIFEST_DIR")).join(path).is_file(), "{}", path);
        // directory patterns end in '/'
        assert!(
            !excluded.iter().any(|pat| pat.ends_with('/') && path.starts_with(pat)),
            "{} is excluded from the package",
            path
        );
    }
}
