//! Flat parameter record for the 3D glasses.
//!
//! Angles are in degrees, offsets in head-scale units.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneParams {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Temple splay.
    pub opening_angle: f32,
    /// Front bend; the front plane follows `z = x^2 * -curvature`.
    pub curvature: f32,
    /// Roll of the whole frame.
    pub tilt: f32,
    /// Pitch of the whole frame on the nose.
    pub rotation: f32,
    pub temple_x: f32,
    pub temple_y: f32,
    pub temple_z: f32,
    pub temple_scale: f32,
    pub temple_length: f32,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            x: 0.0,
            y: -0.02,
            z: 0.0,
            opening_angle: 5.0,
            curvature: 0.15,
            tilt: 0.0,
            rotation: 0.0,
            temple_x: 0.48,
            temple_y: 0.0,
            temple_z: -0.02,
            temple_scale: 1.0,
            temple_length: 1.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Scale,
    X,
    Y,
    Z,
    OpeningAngle,
    Curvature,
    Tilt,
    Rotation,
    TempleX,
    TempleY,
    TempleZ,
    TempleScale,
    TempleLength,
}

impl ParamKey {
    pub const ALL: [ParamKey; 13] = [
        ParamKey::Scale,
        ParamKey::X,
        ParamKey::Y,
        ParamKey::Z,
        ParamKey::OpeningAngle,
        ParamKey::Curvature,
        ParamKey::Tilt,
        ParamKey::Rotation,
        ParamKey::TempleX,
        ParamKey::TempleY,
        ParamKey::TempleZ,
        ParamKey::TempleScale,
        ParamKey::TempleLength,
    ];

    /// Wire name of the field.
    pub fn name(self) -> &'static str {
        match self {
            ParamKey::Scale => "scale",
            ParamKey::X => "x",
            ParamKey::Y => "y",
            ParamKey::Z => "z",
            ParamKey::OpeningAngle => "openingAngle",
            ParamKey::Curvature => "curvature",
            ParamKey::Tilt => "tilt",
            ParamKey::Rotation => "rotation",
            ParamKey::TempleX => "templeX",
            ParamKey::TempleY => "templeY",
            ParamKey::TempleZ => "templeZ",
            ParamKey::TempleScale => "templeScale",
            ParamKey::TempleLength => "templeLength",
        }
    }

    pub fn from_name(name: &str) -> Option<ParamKey> {
        ParamKey::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl SceneParams {
    pub fn get(&self, key: ParamKey) -> f32 {
        match key {
            ParamKey::Scale => self.scale,
            ParamKey::X => self.x,
            ParamKey::Y => self.y,
            ParamKey::Z => self.z,
            ParamKey::OpeningAngle => self.opening_angle,
            ParamKey::Curvature => self.curvature,
            ParamKey::Tilt => self.tilt,
            ParamKey::Rotation => self.rotation,
            ParamKey::TempleX => self.temple_x,
            ParamKey::TempleY => self.temple_y,
            ParamKey::TempleZ => self.temple_z,
            ParamKey::TempleScale => self.temple_scale,
            ParamKey::TempleLength => self.temple_length,
        }
    }

    pub fn set(&mut self, key: ParamKey, value: f32) {
        let slot = match key {
            ParamKey::Scale => &mut self.scale,
            ParamKey::X => &mut self.x,
            ParamKey::Y => &mut self.y,
            ParamKey::Z => &mut self.z,
            ParamKey::OpeningAngle => &mut self.opening_angle,
            ParamKey::Curvature => &mut self.curvature,
            ParamKey::Tilt => &mut self.tilt,
            ParamKey::Rotation => &mut self.rotation,
            ParamKey::TempleX => &mut self.temple_x,
            ParamKey::TempleY => &mut self.temple_y,
            ParamKey::TempleZ => &mut self.temple_z,
            ParamKey::TempleScale => &mut self.temple_scale,
            ParamKey::TempleLength => &mut self.temple_length,
        };
        *slot = value;
    }

    /// Reads whichever scene fields are present, defaults for the rest.
    /// `None` when the value holds no scene field at all.
    pub fn from_value(v: &Value) -> Option<SceneParams> {
        let mut params = SceneParams::default();
        let mut found = false;
        for key in ParamKey::ALL {
            let raw = v.get(key.name()).and_then(Value::as_f64).map(|n| n as f32);
            if let Some(n) = raw.filter(|n| n.is_finite()) {
                params.set(key, n);
                found = true;
            }
        }
        found.then_some(params)
    }
}

/// The 3D shape stored in a product's config slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SceneRecord {
    #[serde(flatten)]
    pub params: SceneParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temple_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_key_reads_back_what_was_set() {
        let mut p = SceneParams::default();
        for (i, key) in ParamKey::ALL.into_iter().enumerate() {
            p.set(key, i as f32 + 0.5);
        }
        for (i, key) in ParamKey::ALL.into_iter().enumerate() {
            assert_eq!(p.get(key), i as f32 + 0.5);
            assert_eq!(ParamKey::from_name(key.name()), Some(key));
        }
    }

    #[test]
    fn partial_scene_value_keeps_defaults() {
        let p = SceneParams::from_value(&json!({ "openingAngle": 12.0, "curvature": "x" })).unwrap();
        assert_eq!(p.opening_angle, 12.0);
        assert_eq!(p.curvature, SceneParams::default().curvature);
        assert!(SceneParams::from_value(&json!({ "frontParams": {} })).is_none());
    }

    #[test]
    fn record_flattens_params_next_to_temple_url() {
        let rec = SceneRecord { params: SceneParams::default(), temple_url: Some("t.png".into()) };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["temple_url"], "t.png");
        assert_eq!(v["templeLength"], json!(1.1f32));
        let back: SceneRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, rec);
    }
}
