//! Landmarks -> stabilized 2D head pose.
//!
//! The raw pose is recomputed from scratch every frame and the tracked pose is
//! pulled toward it by exponential smoothing. Before the first face the
//! estimator holds nothing; after it, the pose is only ever replaced, never
//! cleared.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::landmarks::SemanticIndices;
use crate::types::{FrameGeometry, Landmarks};

/// Head pose in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    /// Nose bridge, optionally dropped by a fraction of the eye distance.
    pub position: Vec2,
    /// Reference size for every offset, proportional to the inter-eye distance.
    pub width: f32,
    /// Roll in radians.
    pub angle: f32,
    /// Signed head turn: nose offset from the eye midpoint over eye distance.
    pub yaw: f32,
    pub jaw_left: Vec2,
    pub jaw_right: Vec2,
}

impl HeadPose {
    /// Relative offset in pose-width units -> absolute surface pixels, rotated
    /// with the head and added to `base`.
    pub fn transform_point(&self, base: Vec2, rel: Vec2) -> Vec2 {
        base + Vec2::from_angle(self.angle).rotate(rel * self.width)
    }

    /// Inverse of the rotation part of [`Self::transform_point`]: a surface
    /// pixel delta expressed in face-local pose-width units.
    pub fn to_face_local(&self, delta: Vec2) -> Vec2 {
        if self.width <= f32::EPSILON {
            return Vec2::ZERO;
        }
        Vec2::from_angle(-self.angle).rotate(delta) / self.width
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Smoothing {
    pub position: f32,
    pub width: f32,
    pub angle: f32,
    /// Slower than the rest: yaw jitters more and drives visibility toggles.
    pub yaw: f32,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self { position: 0.25, width: 0.25, angle: 0.25, yaw: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseConfig {
    pub smoothing: Smoothing,
    /// `width = eye distance * width_multiplier`
    pub width_multiplier: f32,
    /// Fraction of the eye distance the anchor point sits below the nose bridge.
    pub bridge_drop: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self { smoothing: Smoothing::default(), width_multiplier: 2.3, bridge_drop: 0.0 }
    }
}

/// Computes the un-smoothed pose for one frame.
pub fn raw_pose(landmarks: &Landmarks, geom: &FrameGeometry, config: &PoseConfig) -> Result<HeadPose> {
    let idx = SemanticIndices::for_geometry(geom);
    let need = idx.required_len();
    if landmarks.len() < need {
        return Err(Error::MissingLandmarks { got: landmarks.len(), need });
    }
    let pt = |i: usize| geom.to_pixels(landmarks.points[i]);

    let nose = pt(idx.nose_bridge);
    let eye_l = pt(idx.eye_left);
    let eye_r = pt(idx.eye_right);

    let eye_vec = eye_r - eye_l;
    let dist = eye_vec.length();
    if !dist.is_finite() || dist <= f32::EPSILON {
        return Err(Error::InvalidConfig("degenerate landmark frame: eyes coincide".into()));
    }
    let mid = (eye_l + eye_r) * 0.5;

    Ok(HeadPose {
        position: nose + Vec2::new(0.0, dist * config.bridge_drop),
        width: dist * config.width_multiplier,
        angle: eye_vec.y.atan2(eye_vec.x),
        yaw: (nose.x - mid.x) / dist,
        jaw_left: pt(idx.jaw_left),
        jaw_right: pt(idx.jaw_right),
    })
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Interpolates along the shortest arc so roll never spins the long way round.
fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut d = (b - a) % TAU;
    if d > PI {
        d -= TAU;
    } else if d < -PI {
        d += TAU;
    }
    a + d * t
}

/// Pulls `current` toward `target` by the per-field factors.
pub fn smooth_toward(current: &HeadPose, target: &HeadPose, s: &Smoothing) -> HeadPose {
    HeadPose {
        position: current.position.lerp(target.position, s.position),
        width: lerp(current.width, target.width, s.width),
        angle: lerp_angle(current.angle, target.angle, s.angle),
        yaw: lerp(current.yaw, target.yaw, s.yaw),
        jaw_left: current.jaw_left.lerp(target.jaw_left, s.position),
        jaw_right: current.jaw_right.lerp(target.jaw_right, s.position),
    }
}

/// Tracks one face across frames.
#[derive(Debug, Clone, Default)]
pub struct PoseEstimator {
    config: PoseConfig,
    current: Option<HeadPose>,
}

impl PoseEstimator {
    pub fn new(config: PoseConfig) -> Self {
        Self { config, current: None }
    }

    pub fn current(&self) -> Option<HeadPose> {
        self.current
    }

    /// Feeds one frame. No face leaves the pose untouched; the first face
    /// snapshots the raw pose directly.
    pub fn update(&mut self, landmarks: Option<&Landmarks>, geom: &FrameGeometry) -> Result<Option<HeadPose>> {
        let Some(landmarks) = landmarks else {
            return Ok(self.current);
        };
        let target = raw_pose(landmarks, geom, &self.config)?;
        let next = match &self.current {
            None => target,
            Some(current) => smooth_toward(current, &target, &self.config.smoothing),
        };
        self.current = Some(next);
        Ok(self.current)
    }
}

/// Which temple a side-dependent rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Yaw thresholds for one use site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YawGate {
    /// Temples are only drawn once `|yaw|` exceeds this.
    pub look_side: f32,
    /// Past this yaw the far temple is hidden.
    pub hide: f32,
}

impl Default for YawGate {
    fn default() -> Self {
        Self { look_side: 0.03, hide: 0.04 }
    }
}

impl YawGate {
    pub fn is_looking_side(&self, yaw: f32) -> bool {
        yaw.abs() > self.look_side
    }

    /// Positive yaw turns the face toward canvas-right, so the right temple is
    /// on the far side of the head. Binary on purpose: no fade band.
    pub fn temple_opacity(&self, side: Side, yaw: f32) -> f32 {
        let far = match side {
            Side::Right => yaw > self.hide,
            Side::Left => yaw < -self.hide,
        };
        if far {
            0.0
        } else {
            1.0
        }
    }
}
