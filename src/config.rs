use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::compositor::CompositorConfig;
use crate::editor3d::DragSensitivity;
use crate::error::Result;
use crate::landmarks::LandmarkerOptions;
use crate::logging::LogConfig;
use crate::pose::{PoseConfig, YawGate};
use crate::pose3d::Pose3DConfig;
use crate::preprocess::DeskewConfig;
use crate::renderer3d::SceneConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub tracking: TrackingConfig,
    pub compositor: CompositorConfig,
    pub scene: SceneConfig,
    pub scene_drag: DragSensitivity,
    pub preprocess: DeskewConfig,
    pub logging: LogConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    pub mirror: bool,
    pub pose: PoseConfig,
    pub pose3d: Pose3DConfig,
    /// Temple hiding for the standalone try-on view.
    pub try_on_gate: YawGate,
    /// Temple hiding inside the editor.
    pub editor_gate: YawGate,
    pub landmarker: LandmarkerOptions,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            mirror: true,
            pose: PoseConfig::default(),
            pose3d: Pose3DConfig::default(),
            try_on_gate: YawGate { look_side: 0.03, hide: 0.08 },
            editor_gate: YawGate { look_side: 0.03, hide: 0.04 },
            landmarker: LandmarkerOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Templates live here.
    pub data_dir: PathBuf,
    pub catalog_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data"), catalog_dir: PathBuf::from("data/catalog") }
    }
}

impl AppConfig {
    /// Reads `path`, falling back to defaults when it is missing or broken,
    /// then writes it back so new fields show up in the file.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    info!(path = %path.display(), "loaded configuration");
                    c
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "error parsing config, using defaults");
                    Self::default()
                }
            }
        } else {
            info!(path = %path.display(), "configuration file not found, creating default");
            Self::default()
        };

        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
