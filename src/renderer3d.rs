//! 3D try-on: textured planes for the front and temples, posed from the head
//! and drawn over the mirrored camera frame with a depth-only head occluder.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec2, Vec3};
use image::{imageops, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geometry::{Geometry, Material, Mesh, Transform};
use crate::pose::Side;
use crate::pose3d::{CameraModel, HeadPose3D};
use crate::raster::{Lights, Rasterizer};
use crate::scene::SceneParams;

pub const MIN_VIEW_ZOOM: f32 = 0.5;
pub const MAX_VIEW_ZOOM: f32 = 3.0;

const FRONT_SEGMENTS: u32 = 24;
const TEMPLE_SEGMENTS: u32 = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OccluderConfig {
    /// Head-local offset of the cylinder center, in head-scale units.
    pub offset: [f32; 3],
    /// Radii (x, z) and height of the cylinder, in head-scale units.
    pub radius_x: f32,
    pub radius_z: f32,
    pub height: f32,
    pub segments: u32,
}

impl Default for OccluderConfig {
    fn default() -> Self {
        Self { offset: [0.0, -0.15, -0.6], radius_x: 0.42, radius_z: 0.5, height: 1.4, segments: 24 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    pub camera: CameraModel,
    pub occluder: OccluderConfig,
    /// Draws the occluder in gray instead of depth-only.
    pub debug_occluder: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gizmo {
    pub side: Side,
    pub screen: Vec2,
}

pub struct Renderer3D {
    config: SceneConfig,
    lights: Lights,
    raster: Rasterizer,
    occluder: Mesh,
    front: Option<Mesh>,
    left: Option<Mesh>,
    right: Option<Mesh>,
    group: Transform,
    params: SceneParams,
    applied_bend: Option<f32>,
    pose: Option<HeadPose3D>,
    view_zoom: f32,
    mirrored: bool,
    disposed: bool,
}

impl Renderer3D {
    pub fn new(config: SceneConfig, mirrored: bool) -> Self {
        let material = if config.debug_occluder {
            Material { texture: None, color: [128, 128, 128], color_write: true, depth_write: true, lit: true }
        } else {
            Material::depth_only()
        };
        let occluder = Mesh::new("occluder", Geometry::cylinder(config.occluder.segments), material);
        Self {
            config,
            lights: Lights::default(),
            raster: Rasterizer::new(1, 1),
            occluder,
            front: None,
            left: None,
            right: None,
            group: Transform::default(),
            params: SceneParams::default(),
            applied_bend: None,
            pose: None,
            view_zoom: 1.0,
            mirrored,
            disposed: false,
        }
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    pub fn has_front(&self) -> bool {
        self.front.is_some()
    }

    pub fn has_temples(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    /// The last rendered frame.
    pub fn image(&self) -> &RgbaImage {
        self.raster.image()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn view_zoom(&self) -> f32 {
        self.view_zoom
    }

    pub fn set_view_zoom(&mut self, zoom: f32) {
        self.view_zoom = zoom.clamp(MIN_VIEW_ZOOM, MAX_VIEW_ZOOM);
    }

    /// Replaces the front plane, sized to the image aspect.
    pub fn set_front_texture(&mut self, texture: Option<Arc<RgbaImage>>) {
        self.front = texture.map(|tex| {
            let aspect = tex.height() as f32 / tex.width().max(1) as f32;
            debug!(w = tex.width(), h = tex.height(), "rebuilding front plane");
            Mesh::new("front", Geometry::plane(1.0, aspect, FRONT_SEGMENTS, 1), Material::textured(tex))
        });
        self.applied_bend = None;
        self.apply_params();
    }

    /// Replaces both temple planes. The hinge sits at the local origin and the
    /// plane runs along +X; the left one is mirrored by scale.
    pub fn set_temple_texture(&mut self, texture: Option<Arc<RgbaImage>>) {
        match texture {
            Some(tex) => {
                let thickness = tex.height() as f32 / tex.width().max(1) as f32;
                let geo = Geometry::plane(1.0, thickness, TEMPLE_SEGMENTS, 1)
                    .bake(Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0)));
                self.left = Some(Mesh::new("temple_left", geo.clone(), Material::textured(tex.clone())));
                self.right = Some(Mesh::new("temple_right", geo, Material::textured(tex)));
            }
            None => {
                self.left = None;
                self.right = None;
            }
        }
        self.apply_params();
    }

    pub fn set_params(&mut self, params: &SceneParams) {
        self.params = *params;
        self.apply_params();
    }

    fn apply_params(&mut self) {
        let p = self.params;
        let bend = -p.curvature;
        if let Some(front) = &mut self.front {
            if self.applied_bend != Some(bend) {
                front.geometry.apply_bend(bend);
                self.applied_bend = Some(bend);
            }
        }

        let open = p.opening_angle.to_radians();
        let swing = std::f32::consts::FRAC_PI_2 - open;
        if let Some(right) = &mut self.right {
            right.transform = Transform {
                translation: Vec3::new(p.temple_x, p.temple_y, p.temple_z),
                rotation: Quat::from_rotation_y(swing),
                scale: Vec3::new(p.temple_length, p.temple_scale, 1.0),
            };
        }
        if let Some(left) = &mut self.left {
            left.transform = Transform {
                translation: Vec3::new(-p.temple_x, p.temple_y, p.temple_z),
                rotation: Quat::from_rotation_y(-swing),
                scale: Vec3::new(-p.temple_length, p.temple_scale, 1.0),
            };
        }
        self.place();
    }

    /// Positions the glasses group and occluder from the head pose.
    pub fn update(&mut self, pose: Option<&HeadPose3D>) {
        if let Some(pose) = pose {
            self.pose = Some(*pose);
        }
        self.place();
    }

    fn place(&mut self) {
        let Some(pose) = self.pose else {
            return;
        };
        let p = &self.params;
        let offset = pose.rotation * (Vec3::new(p.x, p.y, p.z) * pose.scale);
        self.group = Transform {
            translation: pose.position + offset,
            rotation: pose.rotation * Quat::from_rotation_x(p.rotation.to_radians()) * Quat::from_rotation_z(p.tilt.to_radians()),
            scale: Vec3::splat(pose.scale * p.scale),
        };

        let occ = &self.config.occluder;
        let occ_offset = pose.rotation * (Vec3::from(occ.offset) * pose.scale);
        self.occluder.transform = Transform {
            translation: pose.position + occ_offset,
            rotation: pose.rotation,
            scale: Vec3::new(occ.radius_x, occ.height, occ.radius_z) * pose.scale,
        };
    }

    fn view_proj(&self, width: u32, height: u32) -> Mat4 {
        let aspect = width as f32 / height.max(1) as f32;
        let zoom = Mat4::from_scale(Vec3::new(self.view_zoom, self.view_zoom, 1.0));
        zoom * self.config.camera.projection(aspect)
    }

    /// Draws the background frame and, once a pose is known, the glasses.
    pub fn render(&mut self, frame: &RgbImage) -> &RgbaImage {
        let mut background = image::DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
        if self.mirrored {
            imageops::flip_horizontal_in_place(&mut background);
        }
        self.raster.clear(background);
        if self.disposed || self.pose.is_none() {
            return self.raster.image();
        }

        let vp = self.view_proj(frame.width(), frame.height());
        let group = self.group.matrix();
        self.raster.draw_mesh(&self.occluder, self.occluder.transform.matrix(), vp, &self.lights);
        for mesh in [&self.front, &self.left, &self.right].into_iter().flatten() {
            self.raster.draw_mesh(mesh, group * mesh.transform.matrix(), vp, &self.lights);
        }
        self.raster.image()
    }

    /// Screen positions of the temple ends, for the editor.
    pub fn gizmos(&self) -> Vec<Gizmo> {
        if self.pose.is_none() {
            return Vec::new();
        }
        let (w, h) = self.raster.image().dimensions();
        let vp = self.view_proj(w, h);
        [(Side::Left, &self.left), (Side::Right, &self.right)]
            .into_iter()
            .filter_map(|(side, mesh)| {
                let mesh = mesh.as_ref()?;
                let world = self.group.matrix() * mesh.transform.matrix();
                let end = world.transform_point3(Vec3::new(1.0, 0.0, 0.0));
                self.raster.project(end, vp).map(|screen| Gizmo { side, screen })
            })
            .collect()
    }

    /// Drops all meshes and textures. Safe to call more than once; returns
    /// how many meshes were released.
    pub fn dispose(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        let released = [self.front.take(), self.left.take(), self.right.take()].into_iter().flatten().count() + 1;
        self.occluder.geometry = Geometry::default();
        self.occluder.visible = false;
        self.raster = Rasterizer::new(1, 1);
        self.disposed = true;
        info!(released, "3D scene disposed");
        released
    }
}

impl Drop for Renderer3D {
    fn drop(&mut self) {
        self.dispose();
    }
}
