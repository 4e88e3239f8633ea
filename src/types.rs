use glam::Vec2;

/// Represents a single 3D point
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One face worth of landmarks, normalized to the source image (x/y in 0..1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    pub points: Vec<Point3D>,
}

impl Landmarks {
    pub fn new(points: Vec<Point3D>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point3D> {
        self.points.get(index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// Pixel box, inclusive of `x`/`y`, exclusive of `x + width`/`y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How normalized landmarks land on the render surface.
///
/// The camera feed is front-facing, so the surface shows it mirrored by default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub mirrored: bool,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, mirrored: bool) -> Self {
        Self { width, height, mirrored }
    }

    /// Normalized landmark -> surface pixel.
    pub fn to_pixels(&self, p: Point3D) -> Vec2 {
        let x = if self.mirrored { 1.0 - p.x } else { p.x };
        Vec2::new(x * self.width as f32, p.y * self.height as f32)
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}
