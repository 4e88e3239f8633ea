//! Product records and the opaque AR config slot they carry.
//!
//! A record's `ar_config` may hold the 2D anchor config, the flat 3D scene
//! params, both side by side, or nothing usable. Older records store it as a
//! JSON string instead of an object.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::ar_config::ArConfig;
use crate::error::{Error, Result};
use crate::scene::{SceneParams, SceneRecord};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProductRecord {
    pub id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub ar_config: Option<Value>,
}

/// Both config shapes as read from one slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductArConfig {
    pub flat: Option<ArConfig>,
    pub scene: Option<SceneParams>,
    pub temple_url: Option<String>,
}

impl ProductArConfig {
    pub fn from_value(v: &Value) -> Self {
        let parsed;
        let v = match v {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(inner) => {
                    parsed = inner;
                    &parsed
                }
                Err(e) => {
                    warn!(error = %e, "ar_config string is not JSON");
                    return Self::default();
                }
            },
            other => other,
        };
        Self {
            flat: ArConfig::from_value(v),
            scene: SceneParams::from_value(v),
            temple_url: v.get("temple_url").and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_none() && self.scene.is_none() && self.temple_url.is_none()
    }

    /// One object holding whichever shapes are present.
    pub fn to_value(&self) -> Result<Value> {
        let mut out = Map::new();
        if let Some(flat) = &self.flat {
            if let Value::Object(m) = serde_json::to_value(flat)? {
                out.extend(m);
            }
        }
        if self.scene.is_some() || self.temple_url.is_some() {
            let rec = SceneRecord { params: self.scene.unwrap_or_default(), temple_url: self.temple_url.clone() };
            if let Value::Object(m) = serde_json::to_value(&rec)? {
                out.extend(m);
            }
        }
        Ok(Value::Object(out))
    }
}

impl ProductRecord {
    pub fn ar(&self) -> ProductArConfig {
        self.ar_config.as_ref().map(ProductArConfig::from_value).unwrap_or_default()
    }
}

/// One JSON file per product in a directory.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    dir: PathBuf,
}

impl JsonCatalog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::InvalidConfig(format!("bad product id {id:?}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn load(&self, id: &str) -> Result<ProductRecord> {
        let path = self.path_for(id)?;
        let content = fs::read_to_string(&path)?;
        let record: ProductRecord = serde_json::from_str(&content)?;
        debug!(id, path = %path.display(), "loaded product");
        Ok(record)
    }

    pub fn save(&self, record: &ProductRecord) -> Result<()> {
        let path = self.path_for(&record.id)?;
        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        info!(id = %record.id, path = %path.display(), "saved product");
        Ok(())
    }

    /// Replaces only the AR config slot of an existing record.
    pub fn update_ar_config(&self, id: &str, ar_config: Value) -> Result<ProductRecord> {
        let mut record = self.load(id)?;
        record.ar_config = Some(ar_config);
        self.save(&record)?;
        Ok(record)
    }
}
