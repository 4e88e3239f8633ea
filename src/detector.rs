use image::{imageops::FilterType, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::types::Rect;

const INPUT_W: u32 = 320;
const INPUT_H: u32 = 240;

pub(crate) fn model_err(e: impl std::fmt::Display) -> Error {
    Error::Landmarker(e.to_string())
}

pub(crate) fn load_session(model_path: &str) -> Result<Session> {
    Session::builder()
        .map_err(model_err)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(model_err)?
        .with_intra_threads(4)
        .map_err(model_err)?
        .commit_from_file(model_path)
        .map_err(|e| Error::Landmarker(format!("{model_path}: {e}")))
}

/// UltraFace box detector used to crop the face before the mesh runs.
pub struct FaceDetector {
    session: Session,
    anchors: Vec<[f32; 4]>, // cx, cy, w, h
    min_confidence: f32,
}

impl FaceDetector {
    pub fn new(model_path: &str, min_confidence: f32) -> Result<Self> {
        Ok(Self {
            session: load_session(model_path)?,
            anchors: prior_boxes(INPUT_W as usize, INPUT_H as usize),
            min_confidence,
        })
    }

    /// Best face box in frame pixels, with its score.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Option<(Rect, f32)>> {
        let resized = image::imageops::resize(frame, INPUT_W, INPUT_H, FilterType::Triangle);

        // NCHW, (p - 127) / 128
        let plane = (INPUT_W * INPUT_H) as usize;
        let mut input = vec![0.0f32; 3 * plane];
        for (i, px) in resized.pixels().enumerate() {
            for c in 0..3 {
                input[c * plane + i] = (px[c] as f32 - 127.0) / 128.0;
            }
        }

        let tensor = Tensor::from_array((vec![1usize, 3, INPUT_H as usize, INPUT_W as usize], input))
            .map_err(model_err)?;
        let outputs = self.session.run(ort::inputs![tensor]).map_err(model_err)?;
        let (_, scores) = outputs["scores"].try_extract_tensor::<f32>().map_err(model_err)?;
        let (_, boxes) = outputs["boxes"].try_extract_tensor::<f32>().map_err(model_err)?;

        let Some((rect, score)) = decode_best(&self.anchors, scores, boxes, self.min_confidence) else {
            return Ok(None);
        };

        let sx = frame.width() as f32;
        let sy = frame.height() as f32;
        Ok(Some((
            Rect::new(rect.x * sx, rect.y * sy, rect.width * sx, rect.height * sy),
            score,
        )))
    }
}

/// Picks the highest scoring box above `threshold`, in normalized units.
fn decode_best(anchors: &[[f32; 4]], scores: &[f32], boxes: &[f32], threshold: f32) -> Option<(Rect, f32)> {
    const CENTER_VARIANCE: f32 = 0.1;
    const SIZE_VARIANCE: f32 = 0.2;

    let count = anchors.len().min(scores.len() / 2).min(boxes.len() / 4);
    let mut best: Option<(Rect, f32)> = None;

    for i in 0..count {
        let score = scores[i * 2 + 1];
        if score < threshold || best.map_or(false, |(_, s)| score <= s) {
            continue;
        }
        let [ax, ay, aw, ah] = anchors[i];
        let cx = boxes[i * 4] * CENTER_VARIANCE * aw + ax;
        let cy = boxes[i * 4 + 1] * CENTER_VARIANCE * ah + ay;
        let w = (boxes[i * 4 + 2] * SIZE_VARIANCE).exp() * aw;
        let h = (boxes[i * 4 + 3] * SIZE_VARIANCE).exp() * ah;
        best = Some((Rect::new(cx - w / 2.0, cy - h / 2.0, w, h), score));
    }
    best
}

fn prior_boxes(width: usize, height: usize) -> Vec<[f32; 4]> {
    const STRIDES: [usize; 4] = [8, 16, 32, 64];
    const MIN_BOXES: [&[f32]; 4] = [&[10.0, 16.0, 24.0], &[32.0, 48.0], &[64.0, 96.0], &[128.0, 192.0, 256.0]];

    let (w, h) = (width as f32, height as f32);
    let mut priors = Vec::new();
    for (stride, sizes) in STRIDES.iter().zip(MIN_BOXES) {
        let s = *stride as f32;
        let rows = (h / s).ceil() as usize;
        let cols = (w / s).ceil() as usize;
        for v in 0..rows {
            for u in 0..cols {
                let cx = (u as f32 * s + s / 2.0) / w;
                let cy = (v as f32 * s + s / 2.0) / h;
                for &size in sizes {
                    priors.push([cx, cy, size / w, size / h]);
                }
            }
        }
    }
    priors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_count_matches_ultraface_layout() {
        assert_eq!(prior_boxes(320, 240).len(), 4420);
    }

    #[test]
    fn decode_keeps_highest_score_above_threshold() {
        let anchors = vec![[0.5, 0.5, 0.2, 0.2], [0.25, 0.25, 0.1, 0.1]];
        let scores = vec![0.6, 0.4, 0.1, 0.9];
        let boxes = vec![0.0; 8];
        let (rect, score) = decode_best(&anchors, &scores, &boxes, 0.5).unwrap();
        assert_eq!(score, 0.9);
        assert!((rect.x - 0.2).abs() < 1e-6);
        assert!((rect.width - 0.1).abs() < 1e-6);

        assert!(decode_best(&anchors, &scores, &boxes, 0.95).is_none());
    }
}
