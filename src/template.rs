//! Device-local default templates: tuned parameters a new product can start
//! from. Templates never carry image URLs.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::anchor::ArModel;
use crate::ar_config::{ArConfig, ArParams};
use crate::error::Result;
use crate::scene::SceneParams;

pub const AR_TEMPLATE_FILE: &str = "ar_template.json";
pub const SCENE_TEMPLATE_FILE: &str = "scene_template.json";

const LEGACY_URL_KEYS: [&str; 4] = ["front", "left", "right", "temple_url"];

#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

fn read_json(path: &Path) -> Result<Option<Value>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn has_legacy_urls(v: &Value) -> bool {
    LEGACY_URL_KEYS.iter().any(|k| v.get(k).is_some_and(Value::is_string))
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn ar_path(&self) -> PathBuf {
        self.dir.join(AR_TEMPLATE_FILE)
    }

    pub fn scene_path(&self) -> PathBuf {
        self.dir.join(SCENE_TEMPLATE_FILE)
    }

    fn write(&self, path: &Path, value: &impl serde::Serialize) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, serde_json::to_string_pretty(value)?)?;
        info!(path = %path.display(), "template saved");
        Ok(())
    }

    pub fn save_ar(&self, params: &ArParams) -> Result<()> {
        self.write(&self.ar_path(), params)
    }

    /// `Ok(None)` when no template exists or the stored one still carries
    /// image URLs from an older format.
    pub fn load_ar(&self) -> Result<Option<ArParams>> {
        let path = self.ar_path();
        let Some(v) = read_json(&path)? else {
            return Ok(None);
        };
        if has_legacy_urls(&v) {
            warn!(path = %path.display(), "ignoring template with image URLs");
            return Ok(None);
        }
        let Some(cfg) = ArConfig::from_value(&v) else {
            warn!(path = %path.display(), "template holds no anchor params");
            return Ok(None);
        };
        let defaults = ArModel::default().params();
        Ok(Some(ArParams {
            front_params: cfg.front_params.unwrap_or(defaults.front_params),
            left_params: cfg.left_params.unwrap_or(defaults.left_params),
            right_params: cfg.right_params.unwrap_or(defaults.right_params),
            auto_anchors: cfg.auto_anchors.unwrap_or(defaults.auto_anchors),
        }))
    }

    pub fn save_scene(&self, params: &SceneParams) -> Result<()> {
        self.write(&self.scene_path(), params)
    }

    pub fn load_scene(&self) -> Result<Option<SceneParams>> {
        let path = self.scene_path();
        let Some(v) = read_json(&path)? else {
            return Ok(None);
        };
        if has_legacy_urls(&v) {
            warn!(path = %path.display(), "ignoring template with image URLs");
            return Ok(None);
        }
        Ok(SceneParams::from_value(&v))
    }

    /// Removes both templates; missing files are fine.
    pub fn clear(&self) -> Result<()> {
        for path in [self.ar_path(), self.scene_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::PartKind;
    use crate::error::Error;
    use glam::Vec2;

    #[test]
    fn ar_template_round_trips_without_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());
        assert_eq!(store.load_ar().unwrap(), None);

        let mut model = ArModel::default();
        model.part_mut(PartKind::Left).anchor_ear = Vec2::new(0.02, -0.01);
        model.set_part_image(PartKind::Front, None, Some("https://cdn/front.png".into()));
        store.save_ar(&model.params()).unwrap();

        let raw = fs::read_to_string(store.ar_path()).unwrap();
        assert!(!raw.contains("cdn"));
        assert_eq!(store.load_ar().unwrap(), Some(model.params()));
    }

    #[test]
    fn legacy_template_with_urls_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());
        fs::write(store.ar_path(), r#"{"front":"a.png","frontParams":{"x":0,"y":0,"scale":1}}"#).unwrap();
        assert_eq!(store.load_ar().unwrap(), None);
        fs::write(store.scene_path(), r#"{"temple_url":"t.png","scale":1.5}"#).unwrap();
        assert_eq!(store.load_scene().unwrap(), None);
    }

    #[test]
    fn scene_template_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path().join("nested"));
        let params = SceneParams { opening_angle: 7.5, ..SceneParams::default() };
        store.save_scene(&params).unwrap();
        assert_eq!(store.load_scene().unwrap(), Some(params));
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load_scene().unwrap(), None);
    }

    #[test]
    fn corrupt_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());
        fs::write(store.scene_path(), "{not json").unwrap();
        assert!(matches!(store.load_scene(), Err(Error::Json(_))));
    }
}
