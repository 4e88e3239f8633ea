//! Landmarks -> 3D head pose in camera space.
//!
//! Landmarks are lifted onto a plane in front of a pinhole camera that matches
//! the detector's image, then an orthonormal head basis is built from the eye
//! line and the chin-to-nose line.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::landmarks::SemanticIndices;
use crate::types::{FrameGeometry, Landmarks};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraModel {
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Distance of the plane landmarks are lifted onto.
    pub landmark_depth: f32,
}

impl Default for CameraModel {
    fn default() -> Self {
        Self { fov_y: 63.0, near: 0.01, far: 100.0, landmark_depth: 1.0 }
    }
}

impl CameraModel {
    /// World-space extent of the landmark plane.
    pub fn plane_extent(&self, aspect: f32) -> (f32, f32) {
        let h = 2.0 * self.landmark_depth * (self.fov_y.to_radians() / 2.0).tan();
        (h * aspect, h)
    }

    pub fn projection(&self, aspect: f32) -> glam::Mat4 {
        glam::Mat4::perspective_rh(self.fov_y.to_radians(), aspect.max(1e-3), self.near, self.far)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose3D {
    /// Nose bridge in camera space.
    pub position: Vec3,
    pub rotation: Quat,
    /// Uniform scale: inter-eye distance times the width multiplier.
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Pose3DConfig {
    pub position_lerp: f32,
    pub rotation_slerp: f32,
    pub scale_blend: f32,
    pub width_multiplier: f32,
}

impl Default for Pose3DConfig {
    fn default() -> Self {
        Self { position_lerp: 0.3, rotation_slerp: 0.3, scale_blend: 0.3, width_multiplier: 2.3 }
    }
}

pub fn raw_pose_3d(landmarks: &Landmarks, geom: &FrameGeometry, camera: &CameraModel, config: &Pose3DConfig) -> Result<HeadPose3D> {
    let idx = SemanticIndices::for_geometry(geom);
    let need = idx.required_len();
    if landmarks.len() < need {
        return Err(Error::MissingLandmarks { got: landmarks.len(), need });
    }
    let (plane_w, plane_h) = camera.plane_extent(geom.aspect());
    let lift = |i: usize| {
        let p = landmarks.points[i];
        let px = geom.to_pixels(p);
        Vec3::new(
            (px.x / geom.width as f32 - 0.5) * plane_w,
            (0.5 - px.y / geom.height as f32) * plane_h,
            -camera.landmark_depth - p.z * plane_w,
        )
    };

    let nose = lift(idx.nose_bridge);
    let eye_l = lift(idx.eye_left);
    let eye_r = lift(idx.eye_right);
    let chin = lift(idx.chin);

    let eye_vec = eye_r - eye_l;
    let eye_dist = eye_vec.length();
    let up = nose - chin;
    if eye_dist <= f32::EPSILON || up.length_squared() <= f32::EPSILON {
        return Err(Error::InvalidConfig("degenerate landmark frame".into()));
    }

    let x_axis = eye_vec / eye_dist;
    let z_axis = x_axis.cross(up).normalize_or_zero();
    if z_axis == Vec3::ZERO {
        return Err(Error::InvalidConfig("eye line parallel to chin line".into()));
    }
    let y_axis = z_axis.cross(x_axis);
    let rotation = Quat::from_mat3(&Mat3::from_cols(x_axis, y_axis, z_axis)).normalize();

    Ok(HeadPose3D { position: nose, rotation, scale: eye_dist * config.width_multiplier })
}

pub fn smooth_toward_3d(current: &HeadPose3D, target: &HeadPose3D, config: &Pose3DConfig) -> HeadPose3D {
    HeadPose3D {
        position: current.position.lerp(target.position, config.position_lerp),
        rotation: current.rotation.slerp(target.rotation, config.rotation_slerp),
        scale: current.scale + (target.scale - current.scale) * config.scale_blend,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoseTracker3D {
    camera: CameraModel,
    config: Pose3DConfig,
    current: Option<HeadPose3D>,
}

impl PoseTracker3D {
    pub fn new(camera: CameraModel, config: Pose3DConfig) -> Self {
        Self { camera, config, current: None }
    }

    pub fn current(&self) -> Option<HeadPose3D> {
        self.current
    }

    pub fn update(&mut self, landmarks: Option<&Landmarks>, geom: &FrameGeometry) -> Result<Option<HeadPose3D>> {
        let Some(landmarks) = landmarks else {
            return Ok(self.current);
        };
        let target = raw_pose_3d(landmarks, geom, &self.camera, &self.config)?;
        self.current = Some(match &self.current {
            None => target,
            Some(cur) => smooth_toward_3d(cur, &target, &self.config),
        });
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::tests::face;

    fn geom() -> FrameGeometry {
        FrameGeometry::new(640, 480, true)
    }

    #[test]
    fn frontal_face_has_identity_rotation() {
        let pose = raw_pose_3d(&face(0.5, 0.4, 0.1, 0.0), &geom(), &CameraModel::default(), &Pose3DConfig::default()).unwrap();
        assert!(pose.rotation.angle_between(Quat::IDENTITY) < 1e-4);
        assert!(pose.position.z < 0.0);
        assert!(pose.scale > 0.0);
    }

    #[test]
    fn rolled_face_rotates_about_view_axis() {
        let mut lm = face(0.5, 0.4, 0.1, 0.0);
        // tilt the eye line on screen
        lm.points[crate::landmarks::indices::EYE_OUTER_IMAGE_LEFT].y += 0.05;
        lm.points[crate::landmarks::indices::EYE_OUTER_IMAGE_RIGHT].y -= 0.05;
        let pose = raw_pose_3d(&lm, &geom(), &CameraModel::default(), &Pose3DConfig::default()).unwrap();
        let (axis, angle) = pose.rotation.to_axis_angle();
        assert!(angle > 0.1);
        assert!(axis.z.abs() > 0.9);
    }

    #[test]
    fn tracker_snapshots_then_smooths_then_freezes() {
        let mut t = PoseTracker3D::default();
        let a = face(0.5, 0.4, 0.1, 0.0);
        let b = face(0.6, 0.4, 0.1, 0.0);
        let first = t.update(Some(&a), &geom()).unwrap().unwrap();
        let raw_a = raw_pose_3d(&a, &geom(), &CameraModel::default(), &Pose3DConfig::default()).unwrap();
        assert_eq!(first, raw_a);

        let raw_b = raw_pose_3d(&b, &geom(), &CameraModel::default(), &Pose3DConfig::default()).unwrap();
        let second = t.update(Some(&b), &geom()).unwrap().unwrap();
        let expected = raw_a.position.lerp(raw_b.position, 0.3);
        assert!((second.position - expected).length() < 1e-6);

        assert_eq!(t.update(None, &geom()).unwrap(), Some(second));
    }
}
