//! Persisted shape of an AR model.
//!
//! Only numbers and remote image URLs ever go over the wire, never pixels.
//! Loading is tolerant: every field that is missing or has the wrong type falls
//! back to the part's default instead of failing the whole config.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct XY {
    pub x: f32,
    pub y: f32,
}

impl XY {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<glam::Vec2> for XY {
    fn from(v: glam::Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<XY> for glam::Vec2 {
    fn from(v: XY) -> Self {
        glam::Vec2::new(v.x, v.y)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrontParams {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TempleParams {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub anchor_frame: XY,
    pub anchor_ear: XY,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseType {
    #[default]
    Whatsapp,
    Website,
}

/// The editable numbers of a model. Doubles as the undo snapshot and the
/// device-local default template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArParams {
    pub front_params: FrontParams,
    pub left_params: TempleParams,
    pub right_params: TempleParams,
    pub auto_anchors: bool,
}

/// Full wire config as stored in the product's `ar_config` slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArConfig {
    pub front: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_params: Option<FrontParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_params: Option<TempleParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_params: Option<TempleParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_anchors: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_type: Option<PurchaseType>,
}

fn num(obj: &Value, key: &str) -> Option<f32> {
    obj.get(key)?.as_f64().map(|v| v as f32).filter(|v| v.is_finite())
}

fn xy(obj: &Value, key: &str, fallback: XY) -> XY {
    match obj.get(key) {
        Some(v) => XY {
            x: num(v, "x").unwrap_or(fallback.x),
            y: num(v, "y").unwrap_or(fallback.y),
        },
        None => fallback,
    }
}

fn url(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)?.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

impl FrontParams {
    pub fn from_value_or(v: &Value, fallback: FrontParams) -> FrontParams {
        FrontParams {
            x: num(v, "x").unwrap_or(fallback.x),
            y: num(v, "y").unwrap_or(fallback.y),
            scale: num(v, "scale").filter(|s| *s > 0.0).unwrap_or(fallback.scale),
        }
    }
}

impl TempleParams {
    pub fn from_value_or(v: &Value, fallback: TempleParams) -> TempleParams {
        TempleParams {
            x: num(v, "x").unwrap_or(fallback.x),
            y: num(v, "y").unwrap_or(fallback.y),
            scale: num(v, "scale").filter(|s| *s > 0.0).unwrap_or(fallback.scale),
            anchor_frame: xy(v, "anchorFrame", fallback.anchor_frame),
            anchor_ear: xy(v, "anchorEar", fallback.anchor_ear),
        }
    }
}

impl ArConfig {
    /// Reads whatever 2D fields are present. Returns `None` when the value
    /// carries none of them (e.g. it only holds 3D scene params).
    pub fn from_value(v: &Value) -> Option<ArConfig> {
        const KEYS: [&str; 7] = ["front", "left", "right", "frontParams", "leftParams", "rightParams", "autoAnchors"];
        if !v.is_object() || !KEYS.iter().any(|k| v.get(k).is_some()) {
            return None;
        }
        let defaults = crate::anchor::ArModel::default().params();
        Some(ArConfig {
            front: url(v, "front"),
            left: url(v, "left"),
            right: url(v, "right"),
            front_params: v
                .get("frontParams")
                .filter(|p| p.is_object())
                .map(|p| FrontParams::from_value_or(p, defaults.front_params)),
            left_params: v
                .get("leftParams")
                .filter(|p| p.is_object())
                .map(|p| TempleParams::from_value_or(p, defaults.left_params)),
            right_params: v
                .get("rightParams")
                .filter(|p| p.is_object())
                .map(|p| TempleParams::from_value_or(p, defaults.right_params)),
            auto_anchors: v.get("autoAnchors").and_then(Value::as_bool),
            purchase_type: v.get("purchaseType").and_then(|p| serde_json::from_value(p.clone()).ok()),
        })
    }

    pub fn has_images(&self) -> bool {
        self.front.is_some() || self.left.is_some() || self.right.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_params_fall_back_per_field() {
        let cfg = ArConfig::from_value(&json!({
            "frontParams": { "x": 0.1, "scale": "big" },
            "leftParams": { "anchorEar": { "y": 0.2 } },
            "autoAnchors": false
        }))
        .unwrap();
        let defaults = crate::anchor::ArModel::default().params();
        let front = cfg.front_params.unwrap();
        assert_eq!(front.x, 0.1);
        assert_eq!(front.y, defaults.front_params.y);
        assert_eq!(front.scale, defaults.front_params.scale);
        let left = cfg.left_params.unwrap();
        assert_eq!(left.anchor_ear, XY::new(defaults.left_params.anchor_ear.x, 0.2));
        assert!(cfg.right_params.is_none());
        assert_eq!(cfg.auto_anchors, Some(false));
    }

    #[test]
    fn scene_only_value_has_no_flat_config() {
        assert!(ArConfig::from_value(&json!({ "scale": 1.2, "temple_url": "t.png" })).is_none());
        assert!(ArConfig::from_value(&json!("nope")).is_none());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let cfg = ArConfig {
            front: Some("f.png".into()),
            purchase_type: Some(PurchaseType::Website),
            auto_anchors: Some(true),
            ..ArConfig::default()
        };
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["front"], "f.png");
        assert_eq!(v["left"], Value::Null);
        assert_eq!(v["purchaseType"], "website");
        assert_eq!(v["autoAnchors"], true);
    }
}
