//! Triangle meshes for the 3D glasses and the head occluder.

use std::f32::consts::TAU;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec2, Vec3};
use image::RgbaImage;

#[derive(Debug, Clone, Default)]
pub struct Geometry {
    /// Rest positions; deformations are always recomputed from these.
    pub base: Vec<Vec3>,
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub triangles: Vec<[u32; 3]>,
}

impl Geometry {
    /// Plane in XY centered on the origin, `v = 0` along the top edge.
    pub fn plane(width: f32, height: f32, seg_x: u32, seg_y: u32) -> Self {
        let (sx, sy) = (seg_x.max(1), seg_y.max(1));
        let mut base = Vec::with_capacity(((sx + 1) * (sy + 1)) as usize);
        let mut uvs = Vec::with_capacity(base.capacity());
        for j in 0..=sy {
            let v = j as f32 / sy as f32;
            for i in 0..=sx {
                let u = i as f32 / sx as f32;
                base.push(Vec3::new((u - 0.5) * width, (0.5 - v) * height, 0.0));
                uvs.push(Vec2::new(u, v));
            }
        }
        let row = sx + 1;
        let mut triangles = Vec::with_capacity((sx * sy * 2) as usize);
        for j in 0..sy {
            for i in 0..sx {
                let a = j * row + i;
                let b = a + 1;
                let c = a + row;
                let d = c + 1;
                triangles.push([a, c, b]);
                triangles.push([b, c, d]);
            }
        }
        Self { positions: base.clone(), base, uvs, triangles }
    }

    /// Closed cylinder along Y, unit radius and unit height.
    pub fn cylinder(segments: u32) -> Self {
        let n = segments.max(3);
        let mut base = Vec::new();
        for ring in [0.5f32, -0.5] {
            for i in 0..n {
                let t = i as f32 / n as f32 * TAU;
                base.push(Vec3::new(t.cos(), ring, t.sin()));
            }
        }
        let top_center = base.len() as u32;
        base.push(Vec3::new(0.0, 0.5, 0.0));
        let bottom_center = base.len() as u32;
        base.push(Vec3::new(0.0, -0.5, 0.0));

        let mut triangles = Vec::new();
        for i in 0..n {
            let j = (i + 1) % n;
            let (t0, t1, b0, b1) = (i, j, n + i, n + j);
            triangles.push([t0, b0, t1]);
            triangles.push([t1, b0, b1]);
            triangles.push([top_center, t0, t1]);
            triangles.push([bottom_center, b1, b0]);
        }
        let uvs = vec![Vec2::ZERO; base.len()];
        Self { positions: base.clone(), base, uvs, triangles }
    }

    /// Bakes a transform into the rest shape.
    pub fn bake(mut self, m: Mat4) -> Self {
        for p in &mut self.base {
            *p = m.transform_point3(*p);
        }
        self.positions = self.base.clone();
        self
    }

    /// `z = x^2 * bend` from the rest shape.
    pub fn apply_bend(&mut self, bend: f32) {
        for (p, b) in self.positions.iter_mut().zip(&self.base) {
            *p = Vec3::new(b.x, b.y, b.z + b.x * b.x * bend);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub texture: Option<Arc<RgbaImage>>,
    pub color: [u8; 3],
    pub color_write: bool,
    pub depth_write: bool,
    /// Lighting is skipped when false.
    pub lit: bool,
}

impl Material {
    pub fn textured(texture: Arc<RgbaImage>) -> Self {
        Self { texture: Some(texture), color: [255, 255, 255], color_write: true, depth_write: true, lit: true }
    }

    /// Writes depth only, hiding whatever lies behind it.
    pub fn depth_only() -> Self {
        Self { texture: None, color: [0, 0, 0], color_write: false, depth_write: true, lit: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: &'static str,
    pub geometry: Geometry,
    pub material: Material,
    pub transform: Transform,
    pub visible: bool,
}

impl Mesh {
    pub fn new(name: &'static str, geometry: Geometry, material: Material) -> Self {
        Self { name, geometry, material, transform: Transform::default(), visible: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_spans_requested_size() {
        let g = Geometry::plane(2.0, 1.0, 4, 1);
        assert_eq!(g.positions.len(), 10);
        assert_eq!(g.triangles.len(), 8);
        assert_eq!(g.positions[0], Vec3::new(-1.0, 0.5, 0.0));
        assert_eq!(g.uvs[0], Vec2::ZERO);
        assert_eq!(*g.positions.last().unwrap(), Vec3::new(1.0, -0.5, 0.0));
    }

    #[test]
    fn bend_is_recomputed_from_rest_shape() {
        let mut g = Geometry::plane(2.0, 1.0, 2, 1);
        g.apply_bend(0.5);
        g.apply_bend(0.5);
        assert_eq!(g.positions[0].z, 0.5);
        assert_eq!(g.positions[1].z, 0.0);
        g.apply_bend(0.0);
        assert!(g.positions.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn cylinder_is_closed() {
        let g = Geometry::cylinder(24);
        assert_eq!(g.positions.len(), 50);
        assert_eq!(g.triangles.len(), 96);
        assert!(g.positions.iter().all(|p| p.y.abs() <= 0.5));
    }
}
