use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, FuzzySelect};
use glyphtile::brightness::ErosionParams;
use glyphtile::glyphs::{generate_glyph_images, PRINTABLE_END, PRINTABLE_START};
use glyphtile::stats::BrightnessStats;
use glyphtile::video::parse_timestamp;
use glyphtile::{
    check_extension, AppConfig, AsciiConverter, CompressionLevel, ConversionOptions, ProgressPhase, VideoOptions,
    IMAGE_EXTENSIONS, VIDEO_INPUT_EXTENSIONS,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Subcommand, Debug)]
enum Command {
    /// Render an image as glyphs
    Image(RenderArgs),
    /// Render a video as glyphs, frame by frame
    Video(VideoArgs),
    /// Generate a glyph set from a font
    Glyphs(GlyphsArgs),
    /// Show how evenly a glyph set covers the brightness range
    Stats(StatsArgs),
}

#[derive(Parser, Debug)]
#[command(version, about = "Turn images and videos into ASCII art tiled from glyph images.")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Config file (.toml or .json) instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Input file; chosen interactively when omitted
    input: Option<PathBuf>,

    /// Output file (default: <input stem>_ascii.<ext> next to the input)
    output: Option<PathBuf>,

    /// Number of glyph columns
    #[arg(long)]
    columns: Option<u32>,

    /// Erosion kernel size used to score glyphs
    #[arg(long)]
    kernel_size: Option<u32>,

    /// Erosion iterations used to score glyphs
    #[arg(long)]
    iterations: Option<u32>,

    /// Directory of glyph images
    #[arg(long)]
    glyphs: Option<PathBuf>,

    /// Named preset from the config
    #[arg(long, conflicts_with_all = &["small", "large"])]
    preset: Option<String>,

    /// Use the small preset
    #[arg(long, short, default_value_t = false, conflicts_with = "large")]
    small: bool,

    /// Use the large preset
    #[arg(long, short, default_value_t = false)]
    large: bool,

    /// Overwrite the output without asking
    #[arg(long, short, default_value_t = false)]
    yes: bool,
}

#[derive(clap::Args, Debug)]
struct VideoArgs {
    #[command(flatten)]
    render: RenderArgs,

    /// Start time (e.g., 00:01:23.456 or 83.456)
    #[arg(long)]
    start: Option<String>,

    /// End time (e.g., 00:01:23.456 or 83.456)
    #[arg(long)]
    end: Option<String>,

    /// Keep every n-th frame (fractions are truncated)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Compression tier for the rendered video
    #[arg(long, value_enum, conflicts_with = "no_compress")]
    compress: Option<CompressionLevel>,

    /// Keep the rendered video as encoded
    #[arg(long, default_value_t = false)]
    no_compress: bool,
}

#[derive(clap::Args, Debug)]
struct GlyphsArgs {
    /// TrueType/OpenType font file
    font: PathBuf,

    /// Directory to write glyph images to
    #[arg(default_value = "glyphs")]
    out: PathBuf,

    /// Font size in pixels
    #[arg(long, default_value_t = 24.0)]
    size: f32,

    /// First character code
    #[arg(long, default_value_t = PRINTABLE_START)]
    first: u32,

    /// Last character code
    #[arg(long, default_value_t = PRINTABLE_END)]
    last: u32,
}

#[derive(clap::Args, Debug)]
struct StatsArgs {
    /// Directory of glyph images
    glyphs: Option<PathBuf>,

    #[arg(long)]
    kernel_size: Option<u32>,

    #[arg(long)]
    iterations: Option<u32>,

    /// Histogram bins
    #[arg(long, default_value_t = 10)]
    bins: usize,

    /// Print JSON instead of a table
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = AppConfig::load(args.config.as_deref())?;
    let converter = AsciiConverter::with_config(cfg)?;

    match args.cmd {
        Command::Image(render) => run_image(&converter, render),
        Command::Video(video) => run_video(&converter, video),
        Command::Glyphs(glyphs) => run_glyphs(glyphs),
        Command::Stats(stats) => run_stats(&converter, stats),
    }
}

fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Preset options with command-line overrides applied.
fn resolve_options(converter: &AsciiConverter, render: &RenderArgs) -> Result<ConversionOptions> {
    let preset = if render.small {
        "small"
    } else if render.large {
        "large"
    } else if let Some(name) = render.preset.as_deref() {
        name
    } else {
        converter.config().default_preset.as_str()
    };

    let mut opts = converter.options_from_preset(preset)?;
    if let Some(columns) = render.columns {
        opts.columns = columns;
    }
    if let Some(kernel_size) = render.kernel_size {
        opts.erosion.kernel_size = kernel_size;
    }
    if let Some(iterations) = render.iterations {
        opts.erosion.iterations = iterations;
    }
    if let Some(glyphs) = &render.glyphs {
        opts.glyph_dir = glyphs.clone();
    }
    Ok(opts)
}

fn choose_input(input: Option<PathBuf>, extensions: &[&str]) -> Result<PathBuf> {
    if let Some(input) = input {
        return Ok(input);
    }
    if !is_interactive() {
        return Err(anyhow!("Input file must be provided when not running in a terminal."));
    }
    let files = find_media_files(extensions);
    if files.is_empty() {
        return Err(anyhow!(
            "No {} files found in current directory.",
            extensions.join("/")
        ));
    }
    let selection = FuzzySelect::with_theme(&dialoguer::theme::ColorfulTheme::default())
        .with_prompt("Choose an input file")
        .default(0)
        .items(&files)
        .interact()?;
    Ok(PathBuf::from(&files[selection]))
}

fn default_output(input: &Path, ext: &str) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("cannot derive an output name from {}", input.display()))?;
    Ok(input.with_file_name(format!("{}_ascii.{}", stem, ext)))
}

/// False when the user declined to overwrite an existing output.
fn confirm_overwrite(output: &Path, yes: bool) -> Result<bool> {
    if yes || !output.exists() {
        return Ok(true);
    }
    if !is_interactive() {
        return Err(anyhow!("{} already exists; pass --yes to overwrite", output.display()));
    }
    Ok(Confirm::new()
        .with_prompt(format!("{} already exists. Overwrite?", output.display()))
        .default(false)
        .interact()?)
}

fn run_image(converter: &AsciiConverter, render: RenderArgs) -> Result<()> {
    let opts = resolve_options(converter, &render)?;
    let input = choose_input(render.input.clone(), IMAGE_EXTENSIONS)?;
    let output = match render.output.clone() {
        Some(output) => output,
        None => default_output(&input, "png")?,
    };
    if !confirm_overwrite(&output, render.yes)? {
        println!("Operation cancelled.");
        return Ok(());
    }

    println!("Rendering {} with glyphs from {}...", input.display(), opts.glyph_dir.display());
    let grid = converter.convert_image(&input, &output, &opts)?;
    println!(
        "Wrote {} ({} x {} glyphs of {}x{} px)",
        output.display(),
        grid.cols,
        grid.rows,
        grid.tile_width,
        grid.tile_height
    );
    Ok(())
}

fn run_video(converter: &AsciiConverter, args: VideoArgs) -> Result<()> {
    let conv_opts = resolve_options(converter, &args.render)?;
    let start = match args.start.as_deref() {
        Some(s) => parse_timestamp(s).context("parsing --start")?,
        None => 0.0,
    };
    let end = args
        .end
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .context("parsing --end")?;
    let compression = if args.no_compress {
        None
    } else {
        args.compress.or(converter.config().compression)
    };
    let video_opts = VideoOptions::default()
        .with_window(start, end)
        .with_speed_multiplier(args.speed)
        .with_compression(compression);
    // Reject bad parameters before prompting for anything.
    conv_opts.validate()?;
    video_opts.validate()?;

    let input = choose_input(args.render.input.clone(), VIDEO_INPUT_EXTENSIONS)?;
    check_extension(&input, VIDEO_INPUT_EXTENSIONS)?;
    let output = match args.render.output.clone() {
        Some(output) => output,
        None => default_output(&input, "mp4")?,
    };
    if !confirm_overwrite(&output, args.render.yes)? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );

    let summary = converter.convert_video_with_progress(&input, &output, &video_opts, &conv_opts, |progress| {
        match progress.phase {
            ProgressPhase::ConvertingFrames => {
                pb.set_length(progress.total as u64);
                pb.set_position(progress.completed as u64);
            }
            ProgressPhase::BuildingIndex | ProgressPhase::Compressing => pb.set_message(progress.message),
            ProgressPhase::Complete => pb.finish_with_message("Done"),
        }
    });
    if !pb.is_finished() {
        pb.abandon();
    }
    let summary = summary?;

    println!(
        "\nWrote {} frames ({}..={} step {}) to {}",
        summary.frames_written,
        summary.window.start_frame,
        summary.window.end_frame,
        summary.window.step,
        output.display()
    );
    if let Some(outcome) = summary.compression {
        println!(
            "Compressed {:.2} MB -> {:.2} MB ({:.1}% saved)",
            outcome.original_size as f64 / (1024.0 * 1024.0),
            outcome.compressed_size as f64 / (1024.0 * 1024.0),
            outcome.saved_percent()
        );
    }
    Ok(())
}

fn run_glyphs(args: GlyphsArgs) -> Result<()> {
    if args.first > args.last {
        return Err(anyhow!("--first ({}) is after --last ({})", args.first, args.last));
    }
    let written = generate_glyph_images(&args.font, args.size, args.first..=args.last, &args.out)
        .with_context(|| format!("generating glyphs from {}", args.font.display()))?;
    println!("Wrote {} glyph images to {}", written.len(), args.out.display());
    Ok(())
}

fn run_stats(converter: &AsciiConverter, args: StatsArgs) -> Result<()> {
    let glyph_dir = args
        .glyphs
        .or_else(|| converter.config().glyph_dir.clone())
        .unwrap_or_else(|| ConversionOptions::default().glyph_dir);
    let defaults = ErosionParams::default();
    let params = ErosionParams::new(
        args.kernel_size.unwrap_or(defaults.kernel_size),
        args.iterations.unwrap_or(defaults.iterations),
    );
    let opts = ConversionOptions::default().with_glyph_dir(glyph_dir).with_erosion(params);
    let index = converter.load_index(&opts)?;
    let stats = BrightnessStats::from_index(&index, args.bins)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Glyphs:      {}", stats.glyphs);
    println!("Range:       {:.2} .. {:.2}", stats.min, stats.max);
    println!("Mean:        {:.2}", stats.mean);
    println!("Uniformity:  {:.3}", stats.histogram.uniformity());
    let bins = stats.histogram.counts.len();
    let width = (stats.max - stats.min) / bins as f64;
    let peak = stats.histogram.counts.iter().copied().max().unwrap_or(0).max(1);
    for (i, &count) in stats.histogram.counts.iter().enumerate() {
        let lo = stats.min + width * i as f64;
        let bar = "#".repeat(count * 40 / peak);
        println!("{:>7.2} .. {:>7.2} {:>5} {}", lo, lo + width, count, bar);
    }
    Ok(())
}

fn find_media_files(extensions: &[&str]) -> Vec<String> {
    WalkDir::new(".")
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && check_extension(e.path(), extensions).is_ok())
        .filter_map(|e| e.path().to_str().map(str::to_string))
        .collect()
}
