//! 2D try-on: sprites warped onto the mirrored camera frame.

use glam::Vec2;
use image::{GrayImage, Luma, Rgba, RgbImage, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use serde::{Deserialize, Serialize};

use crate::anchor::{ArModel, PartConfig, PartKind};
use crate::pose::{HeadPose, Side, YawGate};

const MIN_OPACITY: f32 = 0.01;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowStyle {
    pub offset_x: f32,
    pub offset_y: f32,
    pub blur_sigma: f32,
    pub alpha: f32,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self { offset_x: 0.0, offset_y: 4.0, blur_sigma: 3.0, alpha: 0.35 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompositorConfig {
    pub shadow: ShadowStyle,
    /// Temple thickness as a fraction of pose width, before the part's scale.
    pub temple_thickness: f32,
    /// Pointer distance that still grabs an anchor handle.
    pub anchor_hit_radius: f32,
    pub handle_radius: i32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self { shadow: ShadowStyle::default(), temple_thickness: 0.08, anchor_hit_radius: 12.0, handle_radius: 6 }
    }
}

/// Where a temple lands on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplePlacement {
    pub frame_point: Vec2,
    pub ear_point: Vec2,
    pub length: f32,
    pub angle: f32,
    pub thickness: f32,
    /// Past 90 degrees the sprite is mirrored vertically to stay upright.
    pub flipped: bool,
}

pub fn temple_anchor_points(pose: &HeadPose, part: &PartConfig, side: Side) -> (Vec2, Vec2) {
    let jaw = match side {
        Side::Left => pose.jaw_left,
        Side::Right => pose.jaw_right,
    };
    let frame_point = pose.transform_point(pose.position, part.anchor_frame + part.offset);
    let ear_point = pose.transform_point(jaw, part.anchor_ear);
    (frame_point, ear_point)
}

pub fn temple_placement(pose: &HeadPose, part: &PartConfig, side: Side, config: &CompositorConfig) -> TemplePlacement {
    let (frame_point, ear_point) = temple_anchor_points(pose, part, side);
    let d = ear_point - frame_point;
    let angle = d.y.atan2(d.x);
    TemplePlacement {
        frame_point,
        ear_point,
        length: d.length(),
        angle,
        thickness: pose.width * config.temple_thickness * part.scale,
        flipped: angle.abs() > std::f32::consts::FRAC_PI_2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontPlacement {
    pub center: Vec2,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

pub fn front_placement(pose: &HeadPose, part: &PartConfig, image_w: u32, image_h: u32) -> FrontPlacement {
    let width = pose.width * part.scale;
    let height = if image_w == 0 { 0.0 } else { width * image_h as f32 / image_w as f32 };
    FrontPlacement {
        center: pose.transform_point(pose.position, part.offset),
        width,
        height,
        angle: pose.angle,
    }
}

/// Temple opacity for this frame, including the looking-side gate.
pub fn temple_visibility(gate: &YawGate, pose: &HeadPose, side: Side) -> f32 {
    if !gate.is_looking_side(pose.yaw) {
        return 0.0;
    }
    gate.temple_opacity(side, pose.yaw)
}

/// What ended up on the canvas, mostly for callers that want to log or test it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawReport {
    pub temples: Vec<(Side, f32)>,
    pub front: bool,
}

impl DrawReport {
    pub fn temple_opacity(&self, side: Side) -> Option<f32> {
        self.temples.iter().find(|(s, _)| *s == side).map(|(_, o)| *o)
    }
}

pub struct Compositor2D {
    config: CompositorConfig,
    gate: YawGate,
    mirrored: bool,
    canvas: RgbaImage,
    layer: RgbaImage,
}

impl Compositor2D {
    pub fn new(config: CompositorConfig, gate: YawGate, mirrored: bool) -> Self {
        Self { config, gate, mirrored, canvas: RgbaImage::new(0, 0), layer: RgbaImage::new(0, 0) }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Draws one frame. Without a pose only the camera frame is shown.
    pub fn render(&mut self, frame: &RgbImage, pose: Option<&HeadPose>, model: &ArModel) -> DrawReport {
        self.draw_background(frame);
        let mut report = DrawReport::default();
        let Some(pose) = pose else {
            return report;
        };

        // handles of the edited temple show even while the temple itself is hidden
        let mut handles = None;

        // right first so the left temple overlaps it
        for (kind, side) in [(PartKind::Right, Side::Right), (PartKind::Left, Side::Left)] {
            let part = model.part(kind);
            if model.editing() == Some(kind) {
                handles = Some(temple_anchor_points(pose, part, side));
            }
            let Some(image) = part.image.as_deref() else {
                continue;
            };
            let opacity = temple_visibility(&self.gate, pose, side);
            report.temples.push((side, opacity));
            if opacity < MIN_OPACITY {
                continue;
            }
            let place = temple_placement(pose, part, side, &self.config);
            if place.length < 1.0 || image.width() == 0 || image.height() == 0 {
                continue;
            }
            let mut projection = Projection::translate(place.frame_point.x, place.frame_point.y)
                * Projection::rotate(place.angle);
            if place.flipped {
                projection = projection * Projection::scale(1.0, -1.0);
            }
            projection = projection
                * Projection::translate(0.0, -place.thickness / 2.0)
                * Projection::scale(place.length / image.width() as f32, place.thickness / image.height() as f32);
            self.draw_sprite(image, &projection, opacity);
        }

        if let Some(image) = model.front.image.as_deref() {
            let place = front_placement(pose, &model.front, image.width(), image.height());
            if place.width >= 1.0 && place.height >= 1.0 {
                let projection = Projection::translate(place.center.x, place.center.y)
                    * Projection::rotate(place.angle)
                    * Projection::translate(-place.width / 2.0, -place.height / 2.0)
                    * Projection::scale(place.width / image.width() as f32, place.height / image.height() as f32);
                self.draw_sprite(image, &projection, 1.0);
                report.front = true;
            }
        }

        if let Some((frame_point, ear_point)) = handles {
            self.draw_anchor_handles(frame_point, ear_point);
        }
        report
    }

    fn draw_background(&mut self, frame: &RgbImage) {
        let (w, h) = frame.dimensions();
        if self.canvas.dimensions() != (w, h) {
            self.canvas = RgbaImage::new(w, h);
            self.layer = RgbaImage::new(w, h);
        }
        for (x, y, px) in frame.enumerate_pixels() {
            let dx = if self.mirrored { w - 1 - x } else { x };
            self.canvas.put_pixel(dx, y, Rgba([px[0], px[1], px[2], 255]));
        }
    }

    fn draw_sprite(&mut self, sprite: &RgbaImage, projection: &Projection, opacity: f32) {
        for px in self.layer.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        warp_into(sprite, projection, Interpolation::Bilinear, Rgba([0, 0, 0, 0]), &mut self.layer);

        let shadow = self.config.shadow;
        if shadow.alpha > 0.0 {
            let alpha = GrayImage::from_fn(self.layer.width(), self.layer.height(), |x, y| {
                Luma([self.layer.get_pixel(x, y)[3]])
            });
            let blurred = if shadow.blur_sigma > 0.0 { gaussian_blur_f32(&alpha, shadow.blur_sigma) } else { alpha };
            let (ox, oy) = (shadow.offset_x.round() as i64, shadow.offset_y.round() as i64);
            let (w, h) = (self.canvas.width() as i64, self.canvas.height() as i64);
            for (x, y, a) in blurred.enumerate_pixels() {
                if a[0] == 0 {
                    continue;
                }
                let (tx, ty) = (x as i64 + ox, y as i64 + oy);
                if tx < 0 || ty < 0 || tx >= w || ty >= h {
                    continue;
                }
                let k = a[0] as f32 / 255.0 * shadow.alpha * opacity;
                blend(self.canvas.get_pixel_mut(tx as u32, ty as u32), [0, 0, 0], k);
            }
        }

        for (src, dst) in self.layer.pixels().zip(self.canvas.pixels_mut()) {
            if src[3] == 0 {
                continue;
            }
            blend(dst, [src[0], src[1], src[2]], src[3] as f32 / 255.0 * opacity);
        }
    }

    /// Screen-space affordances: not rotated with the head.
    fn draw_anchor_handles(&mut self, frame_point: Vec2, ear_point: Vec2) {
        const DASH: f32 = 6.0;
        const GAP: f32 = 4.0;
        let line = Rgba([255, 255, 255, 255]);
        let d = ear_point - frame_point;
        let len = d.length();
        if len > 0.0 {
            let dir = d / len;
            let mut t = 0.0;
            while t < len {
                let a = frame_point + dir * t;
                let b = frame_point + dir * (t + DASH).min(len);
                draw_line_segment_mut(&mut self.canvas, (a.x, a.y), (b.x, b.y), line);
                t += DASH + GAP;
            }
        }
        let r = self.config.handle_radius;
        draw_filled_circle_mut(&mut self.canvas, (frame_point.x as i32, frame_point.y as i32), r, Rgba([0, 200, 255, 255]));
        draw_filled_circle_mut(&mut self.canvas, (ear_point.x as i32, ear_point.y as i32), r, Rgba([255, 120, 0, 255]));
    }
}

fn blend(dst: &mut Rgba<u8>, src: [u8; 3], a: f32) {
    let a = a.clamp(0.0, 1.0);
    for c in 0..3 {
        dst[c] = (src[c] as f32 * a + dst[c] as f32 * (1.0 - a)).round() as u8;
    }
    dst[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pose(yaw: f32) -> HeadPose {
        HeadPose {
            position: Vec2::new(100.0, 80.0),
            width: 100.0,
            angle: 0.0,
            yaw,
            jaw_left: Vec2::new(40.0, 100.0),
            jaw_right: Vec2::new(160.0, 100.0),
        }
    }

    fn model_with_images() -> ArModel {
        let mut model = ArModel::default();
        let sprite = Arc::new(RgbaImage::from_pixel(20, 4, Rgba([200, 0, 0, 255])));
        model.set_part_image(PartKind::Left, Some(sprite.clone()), None);
        model.set_part_image(PartKind::Right, Some(sprite), None);
        model.set_part_image(PartKind::Front, Some(Arc::new(RgbaImage::from_pixel(40, 20, Rgba([0, 0, 255, 255])))), None);
        model
    }

    #[test]
    fn transform_point_rotates_offsets_with_the_head() {
        let mut p = pose(0.0);
        p.angle = std::f32::consts::FRAC_PI_2;
        let out = p.transform_point(p.position, Vec2::new(0.5, 0.0));
        assert!((out - Vec2::new(100.0, 130.0)).length() < 1e-3);
    }

    #[test]
    fn left_temple_flips_right_does_not() {
        let model = ArModel::default();
        let cfg = CompositorConfig::default();
        let left = temple_placement(&pose(0.1), &model.left, Side::Left, &cfg);
        let right = temple_placement(&pose(0.1), &model.right, Side::Right, &cfg);
        assert!(left.flipped);
        assert!(!right.flipped);
        assert!((right.thickness - 8.0).abs() < 1e-4);
    }

    #[test]
    fn front_keeps_image_aspect() {
        let mut part = ArModel::default().front;
        part.scale = 1.5;
        let place = front_placement(&pose(0.0), &part, 200, 50);
        assert_eq!(place.width, 150.0);
        assert_eq!(place.height, 37.5);
        assert_eq!(place.center, Vec2::new(100.0, 75.0));
    }

    #[test]
    fn positive_yaw_hides_right_temple() {
        let mut comp = Compositor2D::new(CompositorConfig::default(), YawGate { look_side: 0.03, hide: 0.04 }, true);
        let frame = RgbImage::new(200, 160);
        let report = comp.render(&frame, Some(&pose(0.10)), &model_with_images());
        assert_eq!(report.temple_opacity(Side::Left), Some(1.0));
        assert_eq!(report.temple_opacity(Side::Right), Some(0.0));
        assert!(report.front);
    }

    #[test]
    fn facing_camera_draws_no_temples() {
        let gate = YawGate::default();
        assert_eq!(temple_visibility(&gate, &pose(0.0), Side::Left), 0.0);
        assert_eq!(temple_visibility(&gate, &pose(0.0), Side::Right), 0.0);
    }

    #[test]
    fn front_sprite_lands_on_canvas() {
        let mut comp = Compositor2D::new(CompositorConfig::default(), YawGate::default(), false);
        let frame = RgbImage::from_pixel(200, 160, image::Rgb([10, 10, 10]));
        comp.render(&frame, Some(&pose(0.0)), &model_with_images());
        let center = comp.canvas().get_pixel(100, 75);
        assert!(center[2] > 200, "expected blue front frame, got {:?}", center);
        let corner = comp.canvas().get_pixel(2, 2);
        assert_eq!(corner.0, [10, 10, 10, 255]);
    }

    #[test]
    fn edited_temple_handles_show_while_temple_is_hidden() {
        let mut comp = Compositor2D::new(CompositorConfig::default(), YawGate::default(), false);
        let mut model = model_with_images();
        model.select_part(Some(PartKind::Left));
        let p = pose(0.0);
        let report = comp.render(&RgbImage::new(200, 160), Some(&p), &model);
        assert_eq!(report.temple_opacity(Side::Left), Some(0.0));

        let (frame_point, ear_point) = temple_anchor_points(&p, &model.left, Side::Left);
        assert_eq!(comp.canvas().get_pixel(frame_point.x as u32, frame_point.y as u32).0, [0, 200, 255, 255]);
        assert_eq!(comp.canvas().get_pixel(ear_point.x as u32, ear_point.y as u32).0, [255, 120, 0, 255]);
    }

    #[test]
    fn background_is_mirrored() {
        let mut comp = Compositor2D::new(CompositorConfig::default(), YawGate::default(), true);
        let mut frame = RgbImage::new(4, 1);
        frame.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        let report = comp.render(&frame, None, &ArModel::default());
        assert_eq!(report, DrawReport::default());
        assert_eq!(comp.canvas().get_pixel(3, 0).0, [255, 0, 0, 255]);
    }
}
