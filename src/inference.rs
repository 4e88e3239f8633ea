use image::{imageops::FilterType, RgbImage};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

use crate::detector::{load_session, model_err, FaceDetector};
use crate::error::{Error, Result};
use crate::landmarks::{indices::MESH_POINTS, LandmarkSource, LandmarkerOptions};
use crate::types::{Landmarks, Point3D, Rect};

const MESH_INPUT: u32 = 192;

/// 468-point face mesh on an ONNX runtime, cropped by [`FaceDetector`].
///
/// Produces at most one face. Landmarks are normalized to the full frame.
pub struct FaceMeshLandmarker {
    mesh: Session,
    detector: FaceDetector,
    options: LandmarkerOptions,
    /// Face box carried over from the last frame while tracking holds.
    tracked: Option<Rect>,
}

impl FaceMeshLandmarker {
    pub fn new(options: LandmarkerOptions) -> Result<Self> {
        if options.max_faces != 1 {
            return Err(Error::Landmarker(format!(
                "only single-face tracking is supported, got max_faces = {}",
                options.max_faces
            )));
        }
        for path in [&options.mesh_model, &options.detector_model] {
            if !Path::new(path).exists() {
                return Err(Error::Landmarker(format!("model file missing: {path}")));
            }
        }
        info!(mesh = %options.mesh_model, refine = options.refine_landmarks, "loading face mesh");
        Ok(Self {
            mesh: load_session(&options.mesh_model)?,
            detector: FaceDetector::new(&options.detector_model, options.min_detection_confidence)?,
            options,
            tracked: None,
        })
    }

    fn run_mesh(&mut self, frame: &RgbImage, roi: Rect) -> Result<Option<(Vec<Point3D>, f32)>> {
        let roi = clip_to_frame(roi, frame.width(), frame.height());
        if roi.width < 2.0 || roi.height < 2.0 {
            return Ok(None);
        }
        let crop = image::imageops::crop_imm(frame, roi.x as u32, roi.y as u32, roi.width as u32, roi.height as u32)
            .to_image();
        let filter = if self.options.refine_landmarks {
            FilterType::CatmullRom
        } else {
            FilterType::Triangle
        };
        let resized = image::imageops::resize(&crop, MESH_INPUT, MESH_INPUT, filter);

        // NHWC in [-1, 1]
        let input: Vec<f32> = resized.pixels().flat_map(|p| p.0.map(|c| c as f32 / 127.5 - 1.0)).collect();
        let tensor = Tensor::from_array((vec![1usize, MESH_INPUT as usize, MESH_INPUT as usize, 3], input))
            .map_err(model_err)?;
        let outputs = self.mesh.run(ort::inputs![tensor]).map_err(model_err)?;

        let (_, raw) = outputs[0].try_extract_tensor::<f32>().map_err(model_err)?;
        if raw.len() < MESH_POINTS * 3 {
            return Err(Error::MissingLandmarks { got: raw.len() / 3, need: MESH_POINTS });
        }
        let presence = if outputs.len() > 1 {
            let (_, flag) = outputs[1].try_extract_tensor::<f32>().map_err(model_err)?;
            flag.first().map_or(1.0, |logit| 1.0 / (1.0 + (-logit).exp()))
        } else {
            1.0
        };

        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let sx = roi.width / MESH_INPUT as f32;
        let sy = roi.height / MESH_INPUT as f32;
        let points = raw
            .chunks_exact(3)
            .take(MESH_POINTS)
            .map(|p| Point3D {
                x: (roi.x + p[0] * sx) / fw,
                y: (roi.y + p[1] * sy) / fh,
                z: p[2] * sx / fw,
            })
            .collect();
        Ok(Some((points, presence)))
    }
}

impl LandmarkSource for FaceMeshLandmarker {
    fn name(&self) -> String {
        "Face Mesh (468 pts)".to_string()
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Option<Landmarks>> {
        let roi = match self.tracked {
            Some(rect) => rect,
            None => match self.detector.detect(frame)? {
                Some((rect, score)) => {
                    debug!(score, "face detected");
                    pad(rect, 0.25)
                }
                None => return Ok(None),
            },
        };

        let Some((mut points, presence)) = self.run_mesh(frame, roi)? else {
            self.tracked = None;
            return Ok(None);
        };
        if presence < self.options.min_tracking_confidence {
            self.tracked = None;
            return Ok(None);
        }

        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let mut next_roi = pad(bounds_px(&points, fw, fh), 0.25);
        if self.options.refine_landmarks {
            // second pass on a crop fitted to the first estimate
            if let Some((refined, _)) = self.run_mesh(frame, next_roi)? {
                points = refined;
                next_roi = pad(bounds_px(&points, fw, fh), 0.25);
            }
        }
        self.tracked = Some(next_roi);
        Ok(Some(Landmarks::new(points)))
    }
}

fn pad(rect: Rect, fraction: f32) -> Rect {
    let pw = rect.width * fraction;
    let ph = rect.height * fraction;
    Rect::new(rect.x - pw / 2.0, rect.y - ph / 2.0, rect.width + pw, rect.height + ph)
}

fn bounds_px(points: &[Point3D], fw: f32, fh: f32) -> Rect {
    let (mut x0, mut y0, mut x1, mut y1) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for p in points {
        x0 = x0.min(p.x * fw);
        y0 = y0.min(p.y * fh);
        x1 = x1.max(p.x * fw);
        y1 = y1.max(p.y * fh);
    }
    Rect::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
}

fn clip_to_frame(rect: Rect, width: u32, height: u32) -> Rect {
    let x = rect.x.max(0.0);
    let y = rect.y.max(0.0);
    let w = (rect.x + rect.width).min(width as f32) - x;
    let h = (rect.y + rect.height).min(height as f32) - y;
    Rect::new(x, y, w.max(0.0), h.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_box_inside_frame() {
        let r = clip_to_frame(Rect::new(-10.0, 5.0, 50.0, 500.0), 100, 100);
        assert_eq!(r, Rect::new(0.0, 5.0, 40.0, 95.0));
    }

    #[test]
    fn bounds_cover_all_points() {
        let pts = [Point3D::new(0.1, 0.2, 0.0), Point3D::new(0.5, 0.6, 0.0)];
        let r = bounds_px(&pts, 100.0, 100.0);
        assert!((r.x - 10.0).abs() < 1e-4 && (r.height - 40.0).abs() < 1e-4);
    }

    #[test]
    fn missing_model_is_reported() {
        let opts = LandmarkerOptions {
            mesh_model: "does/not/exist.onnx".into(),
            ..LandmarkerOptions::default()
        };
        assert!(matches!(FaceMeshLandmarker::new(opts), Err(Error::Landmarker(_))));
    }
}
