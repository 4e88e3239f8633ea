//! Upload pre-processing: straighten a glasses cutout, crop it to its opaque
//! pixels and cap its width. Pure and deterministic.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::PixelBox;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeskewConfig {
    /// Alpha above which a pixel counts as part of the cutout.
    pub alpha_threshold: u8,
    pub max_width: u32,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self { alpha_threshold: 16, max_width: 1024 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deskewed {
    pub image: RgbaImage,
    /// Principal-axis angle of the input in radians, y down.
    pub angle: f32,
    /// Opaque bounds within the rotated canvas.
    pub bbox: PixelBox,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: u64,
    pub centroid: (f64, f64),
    pub mu20: f64,
    pub mu02: f64,
    pub mu11: f64,
}

impl Moments {
    pub fn of(img: &RgbaImage, threshold: u8) -> Option<Moments> {
        let (mut n, mut sx, mut sy) = (0u64, 0f64, 0f64);
        for (x, y, px) in img.enumerate_pixels() {
            if px[3] > threshold {
                n += 1;
                sx += x as f64;
                sy += y as f64;
            }
        }
        if n == 0 {
            return None;
        }
        let (cx, cy) = (sx / n as f64, sy / n as f64);
        let (mut mu20, mut mu02, mut mu11) = (0f64, 0f64, 0f64);
        for (x, y, px) in img.enumerate_pixels() {
            if px[3] > threshold {
                let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                mu20 += dx * dx;
                mu02 += dy * dy;
                mu11 += dx * dy;
            }
        }
        Some(Moments { count: n, centroid: (cx, cy), mu20, mu02, mu11 })
    }

    /// Orientation of the principal axis.
    pub fn angle(&self) -> f32 {
        (0.5 * (2.0 * self.mu11).atan2(self.mu20 - self.mu02)) as f32
    }
}

pub fn opaque_bounds(img: &RgbaImage, threshold: u8) -> Option<PixelBox> {
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0, 0);
    for (x, y, px) in img.enumerate_pixels() {
        if px[3] > threshold {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    (x0 != u32::MAX).then(|| PixelBox { x: x0, y: y0, width: x1 - x0 + 1, height: y1 - y0 + 1 })
}

/// Pads to the diagonal so rotation never clips the cutout.
fn pad_to_diagonal(img: &RgbaImage) -> RgbaImage {
    let (w, h) = img.dimensions();
    let side = ((w as f64).hypot(h as f64).ceil() as u32).max(1);
    let mut canvas = RgbaImage::from_pixel(side, side, Rgba([0, 0, 0, 0]));
    imageops::replace(&mut canvas, img, ((side - w) / 2) as i64, ((side - h) / 2) as i64);
    canvas
}

/// Straightens, crops and downsizes one cutout. An image without any opaque
/// pixel comes back unchanged with a zero angle.
pub fn deskew(input: &RgbaImage, config: &DeskewConfig) -> Deskewed {
    let full = PixelBox { x: 0, y: 0, width: input.width(), height: input.height() };
    let Some(moments) = Moments::of(input, config.alpha_threshold) else {
        return Deskewed { image: input.clone(), angle: 0.0, bbox: full };
    };
    let angle = moments.angle();

    let rotated = rotate_about_center(&pad_to_diagonal(input), -angle, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));
    let bbox = opaque_bounds(&rotated, config.alpha_threshold)
        .unwrap_or(PixelBox { x: 0, y: 0, width: rotated.width(), height: rotated.height() });
    let mut image = imageops::crop_imm(&rotated, bbox.x, bbox.y, bbox.width, bbox.height).to_image();

    if config.max_width > 0 && image.width() > config.max_width {
        let h = ((image.height() as f64 * config.max_width as f64 / image.width() as f64).round() as u32).max(1);
        image = imageops::resize(&image, config.max_width, h, FilterType::Lanczos3);
    }
    debug!(angle_deg = angle.to_degrees(), ?bbox, w = image.width(), h = image.height(), "deskewed cutout");
    Deskewed { image, angle, bbox }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_polygon_mut;
    use imageproc::point::Point;

    /// A thin bar rotated by `deg` on a transparent canvas.
    fn tilted_bar(deg: f32) -> RgbaImage {
        let mut img = RgbaImage::new(200, 200);
        let (c, s) = (deg.to_radians().cos(), deg.to_radians().sin());
        let corners = [(-80.0f32, -10.0f32), (80.0, -10.0), (80.0, 10.0), (-80.0, 10.0)]
            .map(|(x, y)| Point::new((100.0 + x * c - y * s).round() as i32, (100.0 + x * s + y * c).round() as i32));
        draw_polygon_mut(&mut img, &corners, Rgba([200, 30, 30, 255]));
        img
    }

    #[test]
    fn tilted_bar_is_straightened() {
        let out = deskew(&tilted_bar(15.0), &DeskewConfig::default());
        assert!((out.angle.to_degrees() - 15.0).abs() < 1.0, "{}", out.angle.to_degrees());
        assert!(out.image.width() > 3 * out.image.height());
    }

    #[test]
    fn same_input_same_output() {
        let img = tilted_bar(-22.0);
        let a = deskew(&img, &DeskewConfig::default());
        let b = deskew(&img, &DeskewConfig::default());
        assert_eq!(a.angle, b.angle);
        assert_eq!(a.bbox, b.bbox);
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn wide_cutouts_are_downscaled() {
        let cfg = DeskewConfig { max_width: 50, ..DeskewConfig::default() };
        let out = deskew(&tilted_bar(0.0), &cfg);
        assert_eq!(out.image.width(), 50);
        assert!(out.image.height() >= 5 && out.image.height() <= 8);
    }

    #[test]
    fn fully_transparent_passes_through() {
        let img = RgbaImage::new(30, 20);
        let out = deskew(&img, &DeskewConfig::default());
        assert_eq!(out.angle, 0.0);
        assert_eq!(out.bbox, PixelBox { x: 0, y: 0, width: 30, height: 20 });
        assert_eq!(out.image, img);
    }

    #[test]
    fn bounds_are_inclusive_of_edge_pixels() {
        let mut img = RgbaImage::new(10, 10);
        img.put_pixel(2, 3, Rgba([0, 0, 0, 255]));
        img.put_pixel(7, 5, Rgba([0, 0, 0, 255]));
        assert_eq!(opaque_bounds(&img, 16), Some(PixelBox { x: 2, y: 3, width: 6, height: 3 }));
    }
}
