//! The landmark source seam.
//!
//! A detector takes a camera frame and hands back zero or one face worth of
//! normalized landmarks. Everything downstream only sees [`Landmarks`] and the
//! semantic indices below.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use image::RgbImage;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::{FrameGeometry, Landmarks};

/// Face-mesh indices the pose math depends on. These are a fixed contract with
/// the 468-point mesh.
pub mod indices {
    pub const NOSE_BRIDGE: usize = 168;
    /// Outer corner of the eye on the image-left side.
    pub const EYE_OUTER_IMAGE_LEFT: usize = 33;
    pub const EYE_OUTER_IMAGE_RIGHT: usize = 263;
    /// Face edge near the ear, image-left side.
    pub const JAW_IMAGE_LEFT: usize = 234;
    pub const JAW_IMAGE_RIGHT: usize = 454;
    pub const CHIN: usize = 152;
    pub const FOREHEAD_TOP: usize = 10;

    pub const MESH_POINTS: usize = 468;
}

/// Index pair resolution for a surface. When the surface is mirrored the
/// image-left points end up on the canvas-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticIndices {
    pub nose_bridge: usize,
    pub eye_left: usize,
    pub eye_right: usize,
    pub jaw_left: usize,
    pub jaw_right: usize,
    pub chin: usize,
    pub forehead: usize,
}

impl SemanticIndices {
    pub fn for_geometry(geom: &FrameGeometry) -> Self {
        let (eye_left, eye_right, jaw_left, jaw_right) = if geom.mirrored {
            (
                indices::EYE_OUTER_IMAGE_RIGHT,
                indices::EYE_OUTER_IMAGE_LEFT,
                indices::JAW_IMAGE_RIGHT,
                indices::JAW_IMAGE_LEFT,
            )
        } else {
            (
                indices::EYE_OUTER_IMAGE_LEFT,
                indices::EYE_OUTER_IMAGE_RIGHT,
                indices::JAW_IMAGE_LEFT,
                indices::JAW_IMAGE_RIGHT,
            )
        };
        Self {
            nose_bridge: indices::NOSE_BRIDGE,
            eye_left,
            eye_right,
            jaw_left,
            jaw_right,
            chin: indices::CHIN,
            forehead: indices::FOREHEAD_TOP,
        }
    }

    /// Highest index that must exist in a frame.
    pub fn required_len(&self) -> usize {
        [
            self.nose_bridge,
            self.eye_left,
            self.eye_right,
            self.jaw_left,
            self.jaw_right,
            self.chin,
            self.forehead,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LandmarkerOptions {
    pub max_faces: usize,
    /// Finer eye/lip landmarks at the cost of speed.
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub mesh_model: String,
    pub detector_model: String,
}

impl Default for LandmarkerOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: false,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            mesh_model: "models/face_mesh.onnx".to_string(),
            detector_model: "models/face_detection.onnx".to_string(),
        }
    }
}

pub trait LandmarkSource {
    fn name(&self) -> String;

    /// Runs detection on one frame. `Ok(None)` means no face, which is not an
    /// error.
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<Landmarks>>;
}

impl<T: LandmarkSource + ?Sized> LandmarkSource for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Option<Landmarks>> {
        (**self).detect(frame)
    }
}

/// Replays a fixed script of detections, one entry per frame, then repeats the
/// last one.
pub struct ScriptedLandmarks {
    script: Vec<Option<Landmarks>>,
    cursor: usize,
}

impl ScriptedLandmarks {
    pub fn new(script: Vec<Option<Landmarks>>) -> Self {
        Self { script, cursor: 0 }
    }

    pub fn frames_served(&self) -> usize {
        self.cursor
    }
}

impl LandmarkSource for ScriptedLandmarks {
    fn name(&self) -> String {
        "Scripted".to_string()
    }

    fn detect(&mut self, _frame: &RgbImage) -> Result<Option<Landmarks>> {
        if self.script.is_empty() {
            return Ok(None);
        }
        let idx = self.cursor.min(self.script.len() - 1);
        self.cursor += 1;
        Ok(self.script[idx].clone())
    }
}

type Factory<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// Defers building an expensive landmark source until it is first needed.
///
/// `preload` starts the build on a background thread so the model is warm by
/// the time the camera delivers its first frame.
pub struct LazyLandmarker<T: LandmarkSource + Send + 'static> {
    cell: Arc<OnceCell<Mutex<T>>>,
    factory: Arc<Mutex<Option<Factory<T>>>>,
    warmup: Option<JoinHandle<()>>,
    label: String,
}

impl<T: LandmarkSource + Send + 'static> LazyLandmarker<T> {
    pub fn new(label: &str, factory: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            factory: Arc::new(Mutex::new(Some(Box::new(factory)))),
            warmup: None,
            label: label.to_string(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn preload(&mut self) {
        if self.is_loaded() || self.warmup.is_some() {
            return;
        }
        let cell = Arc::clone(&self.cell);
        let factory = Arc::clone(&self.factory);
        let label = self.label.clone();
        self.warmup = Some(std::thread::spawn(move || {
            if let Err(e) = Self::init(&cell, &factory) {
                warn!(model = %label, error = %e, "landmark model warm-up failed");
            }
        }));
    }

    fn init(cell: &OnceCell<Mutex<T>>, factory: &Mutex<Option<Factory<T>>>) -> Result<()> {
        cell.get_or_try_init(|| {
            let build = factory
                .lock()
                .map_err(|_| Error::Landmarker("factory lock poisoned".into()))?
                .take()
                .ok_or_else(|| Error::Landmarker("model failed to load earlier".into()))?;
            let started = std::time::Instant::now();
            let source = build()?;
            info!(model = %source.name(), elapsed_ms = started.elapsed().as_millis() as u64, "landmark model ready");
            Ok::<_, Error>(Mutex::new(source))
        })?;
        Ok(())
    }

    fn loaded(&mut self) -> Result<&Mutex<T>> {
        if let Some(handle) = self.warmup.take() {
            let _ = handle.join();
        }
        Self::init(&self.cell, &self.factory)?;
        self.cell
            .get()
            .ok_or_else(|| Error::Landmarker("model not initialised".into()))
    }
}

impl<T: LandmarkSource + Send + 'static> LandmarkSource for LazyLandmarker<T> {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Option<Landmarks>> {
        let source = self.loaded()?;
        let mut guard = source
            .lock()
            .map_err(|_| Error::Landmarker("landmark source lock poisoned".into()))?;
        guard.detect(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point3D;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn mirrored_indices_swap_sides() {
        let plain = SemanticIndices::for_geometry(&FrameGeometry::new(10, 10, false));
        let mirrored = SemanticIndices::for_geometry(&FrameGeometry::new(10, 10, true));
        assert_eq!(plain.eye_left, mirrored.eye_right);
        assert_eq!(plain.jaw_right, mirrored.jaw_left);
        assert_eq!(plain.required_len(), 455);
    }

    #[test]
    fn scripted_source_repeats_last_entry() {
        let face = Landmarks::new(vec![Point3D::new(0.5, 0.5, 0.0)]);
        let mut src = ScriptedLandmarks::new(vec![None, Some(face.clone())]);
        let frame = RgbImage::new(4, 4);
        assert_eq!(src.detect(&frame).unwrap(), None);
        assert_eq!(src.detect(&frame).unwrap(), Some(face.clone()));
        assert_eq!(src.detect(&frame).unwrap(), Some(face));
        assert_eq!(src.frames_served(), 3);
    }

    #[test]
    fn lazy_landmarker_builds_once() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let mut lazy = LazyLandmarker::new("scripted", || {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedLandmarks::new(vec![None]))
        });
        lazy.preload();
        let frame = RgbImage::new(2, 2);
        assert!(lazy.detect(&frame).unwrap().is_none());
        assert!(lazy.detect(&frame).unwrap().is_none());
        assert!(lazy.is_loaded());
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }
}
