//! Z-buffered triangle rasterizer over an RGBA canvas.

use glam::{Mat4, Vec2, Vec3, Vec4};
use image::{Rgba, RgbaImage};

use crate::geometry::Mesh;

/// Fragments with alpha below this write neither color nor depth.
pub const ALPHA_CUTOFF: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lights {
    pub ambient: f32,
    pub directional: f32,
    /// Direction towards the light, camera space.
    pub direction: Vec3,
}

impl Default for Lights {
    fn default() -> Self {
        Self { ambient: 0.6, directional: 0.6, direction: Vec3::new(0.3, 0.5, 1.0).normalize() }
    }
}

pub struct Rasterizer {
    color: RgbaImage,
    depth: Vec<f32>,
}

struct Vertex {
    screen: Vec2,
    depth: f32,
    inv_w: f32,
    uv_over_w: Vec2,
}

impl Rasterizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { color: RgbaImage::new(width, height), depth: vec![f32::INFINITY; (width * height) as usize] }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.color
    }

    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        self.depth[(y * self.color.width() + x) as usize]
    }

    /// Starts a frame from `background`, resizing when its dimensions change.
    pub fn clear(&mut self, background: RgbaImage) {
        let len = (background.width() * background.height()) as usize;
        self.color = background;
        self.depth.clear();
        self.depth.resize(len, f32::INFINITY);
    }

    /// Screen position of a world point, `None` behind the camera.
    pub fn project(&self, p: Vec3, view_proj: Mat4) -> Option<Vec2> {
        let clip = view_proj * p.extend(1.0);
        (clip.w > 1e-6).then(|| self.to_screen(clip))
    }

    fn to_screen(&self, clip: Vec4) -> Vec2 {
        let ndc = clip.truncate() / clip.w;
        Vec2::new(
            (ndc.x * 0.5 + 0.5) * self.color.width() as f32,
            (0.5 - ndc.y * 0.5) * self.color.height() as f32,
        )
    }

    /// Draws every triangle of `mesh` placed by `model`. Returns the number of
    /// fragments written.
    pub fn draw_mesh(&mut self, mesh: &Mesh, model: Mat4, view_proj: Mat4, lights: &Lights) -> usize {
        if !mesh.visible {
            return 0;
        }
        let mvp = view_proj * model;
        let geo = &mesh.geometry;

        let mut written = 0;
        for tri in &geo.triangles {
            let idx = tri.map(|i| i as usize);
            let world = idx.map(|i| model.transform_point3(geo.positions[i]));
            let clips = idx.map(|i| mvp * geo.positions[i].extend(1.0));
            // whole-triangle near rejection
            if clips.iter().any(|c| c.w <= 1e-6) {
                continue;
            }
            let verts = [0, 1, 2].map(|k| {
                let c = clips[k];
                let inv_w = 1.0 / c.w;
                Vertex {
                    screen: self.to_screen(c),
                    depth: c.z * inv_w,
                    inv_w,
                    uv_over_w: geo.uvs[idx[k]] * inv_w,
                }
            });
            let normal = (world[1] - world[0]).cross(world[2] - world[0]).normalize_or_zero();
            let shade = if mesh.material.lit {
                (lights.ambient + lights.directional * normal.dot(lights.direction).abs()).min(1.0)
            } else {
                1.0
            };
            written += self.fill(&verts, mesh, shade);
        }
        written
    }

    fn fill(&mut self, v: &[Vertex; 3], mesh: &Mesh, shade: f32) -> usize {
        let (w, h) = (self.color.width() as i64, self.color.height() as i64);
        let edge = |a: Vec2, b: Vec2, p: Vec2| (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
        let area = edge(v[0].screen, v[1].screen, v[2].screen);
        if area.abs() < 1e-8 {
            return 0;
        }
        let min_x = v.iter().map(|p| p.screen.x).fold(f32::INFINITY, f32::min).floor().max(0.0) as i64;
        let max_x = (v.iter().map(|p| p.screen.x).fold(f32::NEG_INFINITY, f32::max).ceil() as i64).min(w - 1);
        let min_y = v.iter().map(|p| p.screen.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as i64;
        let max_y = (v.iter().map(|p| p.screen.y).fold(f32::NEG_INFINITY, f32::max).ceil() as i64).min(h - 1);

        let material = &mesh.material;
        let mut written = 0;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let b0 = edge(v[1].screen, v[2].screen, p) / area;
                let b1 = edge(v[2].screen, v[0].screen, p) / area;
                let b2 = 1.0 - b0 - b1;
                if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                    continue;
                }
                let depth = b0 * v[0].depth + b1 * v[1].depth + b2 * v[2].depth;
                if !(0.0..=1.0).contains(&depth) {
                    continue;
                }
                let slot = (y * w + x) as usize;
                if depth >= self.depth[slot] {
                    continue;
                }

                let texel = match &material.texture {
                    Some(tex) => {
                        let inv_w = b0 * v[0].inv_w + b1 * v[1].inv_w + b2 * v[2].inv_w;
                        let uv = (v[0].uv_over_w * b0 + v[1].uv_over_w * b1 + v[2].uv_over_w * b2) / inv_w;
                        sample(tex, uv)
                    }
                    None => Rgba([material.color[0], material.color[1], material.color[2], 255]),
                };
                if texel[3] < ALPHA_CUTOFF {
                    continue;
                }
                if material.depth_write {
                    self.depth[slot] = depth;
                }
                if material.color_write {
                    let dst = self.color.get_pixel_mut(x as u32, y as u32);
                    let a = texel[3] as f32 / 255.0;
                    for c in 0..3 {
                        let src = texel[c] as f32 * shade;
                        dst[c] = (src * a + dst[c] as f32 * (1.0 - a)).round().clamp(0.0, 255.0) as u8;
                    }
                    dst[3] = 255;
                }
                written += 1;
            }
        }
        written
    }
}

fn sample(tex: &RgbaImage, uv: Vec2) -> Rgba<u8> {
    let x = (uv.x.clamp(0.0, 1.0) * (tex.width() as f32 - 1.0)).round() as u32;
    let y = (uv.y.clamp(0.0, 1.0) * (tex.height() as f32 - 1.0)).round() as u32;
    *tex.get_pixel(x, y)
}
