use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use rusty_glasses::anchor::ArModel;
use rusty_glasses::catalog::ProductRecord;
use rusty_glasses::scene::ParamKey;

/// Prints what a product record's AR config slot holds.
#[derive(Parser, Debug)]
struct Cli {
    /// Product JSON file
    product: PathBuf,
}

fn flag(present: bool) -> ColoredString {
    if present {
        "yes".green()
    } else {
        "no".red()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let content = std::fs::read_to_string(&cli.product).with_context(|| format!("Failed to read {}", cli.product.display()))?;
    let record: ProductRecord = serde_json::from_str(&content).context("Not a product record")?;
    let ar = record.ar();

    println!("{} {}", "Product:".bold(), record.id);
    println!("  image_url:  {}", record.image_url.as_deref().unwrap_or("-"));
    println!("  2D config:  {}", flag(ar.flat.is_some()));
    println!("  3D params:  {}", flag(ar.scene.is_some()));
    println!("  temple_url: {}", ar.temple_url.as_deref().unwrap_or("-"));

    if let Some(flat) = &ar.flat {
        let mut model = ArModel::default();
        let pending = model.apply_config(flat);
        println!("\n{}", "2D".bold());
        println!("  image URLs: {}", flag(flat.has_images()));
        println!("  images pending: {}", pending.len());
        for p in &pending {
            println!("    {:?}: {}", p.part, p.url);
        }
        println!("  effective: {}", serde_json::to_string_pretty(&model.params())?);
    }

    if let Some(scene) = &ar.scene {
        println!("\n{}", "3D".bold());
        for key in ParamKey::ALL {
            println!("  {:<14} {:>8.3}", key.name(), scene.get(key));
        }
    }
    Ok(())
}
