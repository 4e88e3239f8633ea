use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use image::ImageReader;
use rusty_glasses::preprocess::{deskew, DeskewConfig, Moments};

/// Straightens a transparent glasses cutout the same way uploads are.
#[derive(Parser, Debug)]
struct Cli {
    input: PathBuf,

    /// Output PNG (default: <input>_deskewed.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = DeskewConfig::default().max_width)]
    max_width: u32,

    #[arg(long, default_value_t = DeskewConfig::default().alpha_threshold)]
    alpha_threshold: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let img = ImageReader::open(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?
        .decode()?
        .into_rgba8();
    println!("Loaded {:?} ({}x{})", cli.input, img.width(), img.height());

    let config = DeskewConfig { alpha_threshold: cli.alpha_threshold, max_width: cli.max_width };
    match Moments::of(&img, config.alpha_threshold) {
        Some(m) => println!("Opaque pixels: {}, centroid ({:.1}, {:.1})", m.count, m.centroid.0, m.centroid.1),
        None => println!("{}", "No opaque pixels, image is passed through".yellow()),
    }

    let out = deskew(&img, &config);
    println!("Angle: {:.2} deg", out.angle.to_degrees());
    println!("Crop:  x={} y={} {}x{}", out.bbox.x, out.bbox.y, out.bbox.width, out.bbox.height);
    println!("Size:  {}x{}", out.image.width(), out.image.height());

    let output = cli.output.unwrap_or_else(|| {
        let stem = cli.input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        cli.input.with_file_name(format!("{stem}_deskewed.png"))
    });
    out.image.save(&output).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("{} {:?}", "Saved".green(), output);
    Ok(())
}
