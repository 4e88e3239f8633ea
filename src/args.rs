use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// 2D glasses on the live camera
    TryOn,
    /// 2D anchor editor
    Editor,
    /// 3D glasses editor
    Mesh,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera Index (default 0)
    #[arg(short, long, default_value_t = 0)]
    pub cam_index: u32,

    #[arg(short, long, value_enum, default_value_t = Mode::TryOn)]
    pub mode: Mode,

    /// Configuration file, created with defaults if missing
    #[arg(long, default_value = crate::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Product to load from the catalog
    #[arg(short, long)]
    pub product: Option<String>,

    /// Catalog directory (overrides the config)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Force mirroring on or off (overrides the config)
    #[arg(long)]
    pub mirror: Option<bool>,

    /// Local front image to use instead of the product's
    #[arg(long)]
    pub front_image: Option<PathBuf>,

    /// Local temple image to use instead of the product's
    #[arg(long)]
    pub temple_image: Option<PathBuf>,

    /// List available cameras
    #[arg(long)]
    pub list: bool,
}
