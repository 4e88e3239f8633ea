pub mod anchor;
pub mod ar_config;
pub mod args;
pub mod camera;
pub mod catalog;
pub mod compositor;
pub mod config;
pub mod detector;
pub mod editor;
pub mod editor3d;
pub mod error;
pub mod geometry;
pub mod images;
pub mod inference;
pub mod landmarks;
pub mod logging;
pub mod output;
pub mod pose;
pub mod pose3d;
pub mod preprocess;
pub mod raster;
pub mod renderer3d;
pub mod scene;
pub mod session;
pub mod template;
pub mod types;

pub use error::{Error, Result};
