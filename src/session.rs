//! The per-camera loop: capture -> detect -> pose -> render.
//!
//! Each step runs detection to completion before the next capture, so there
//! is never more than one frame in flight. A session owns its camera, landmark
//! source, pose state and renderer; nothing is shared between sessions.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{RgbImage, RgbaImage};
use tracing::{debug, info, warn};

use crate::anchor::ArModel;
use crate::compositor::{Compositor2D, DrawReport};
use crate::error::{Error, Result};
use crate::landmarks::LandmarkSource;
use crate::pose::{HeadPose, PoseEstimator};
use crate::pose3d::{HeadPose3D, PoseTracker3D};
use crate::renderer3d::Renderer3D;
use crate::types::{FrameGeometry, Landmarks};

pub trait FrameSource {
    fn capture(&mut self) -> Result<RgbImage>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Stops the device. Must be safe to call more than once.
    fn release(&mut self);
    fn is_released(&self) -> bool;
}

pub trait PoseTracker {
    type Pose: Copy;

    fn track(&mut self, landmarks: Option<&Landmarks>, geom: &FrameGeometry) -> Result<Option<Self::Pose>>;
}

impl PoseTracker for PoseEstimator {
    type Pose = HeadPose;

    fn track(&mut self, landmarks: Option<&Landmarks>, geom: &FrameGeometry) -> Result<Option<HeadPose>> {
        self.update(landmarks, geom)
    }
}

impl PoseTracker for PoseTracker3D {
    type Pose = HeadPose3D;

    fn track(&mut self, landmarks: Option<&Landmarks>, geom: &FrameGeometry) -> Result<Option<HeadPose3D>> {
        self.update(landmarks, geom)
    }
}

pub trait OverlayRenderer {
    type Pose;

    fn draw(&mut self, frame: &RgbImage, pose: Option<&Self::Pose>) -> Result<()>;
    fn surface(&self) -> &RgbaImage;
    fn dispose(&mut self);
}

/// The 2D compositor together with the anchor model it draws.
pub struct Overlay2D {
    pub compositor: Compositor2D,
    pub model: ArModel,
    last_report: DrawReport,
}

impl Overlay2D {
    pub fn new(compositor: Compositor2D, model: ArModel) -> Self {
        Self { compositor, model, last_report: DrawReport::default() }
    }

    pub fn last_report(&self) -> &DrawReport {
        &self.last_report
    }
}

impl OverlayRenderer for Overlay2D {
    type Pose = HeadPose;

    fn draw(&mut self, frame: &RgbImage, pose: Option<&HeadPose>) -> Result<()> {
        self.last_report = self.compositor.render(frame, pose, &self.model);
        Ok(())
    }

    fn surface(&self) -> &RgbaImage {
        self.compositor.canvas()
    }

    fn dispose(&mut self) {
        for kind in crate::anchor::PartKind::ALL {
            self.model.part_mut(kind).image = None;
        }
    }
}

impl OverlayRenderer for Renderer3D {
    type Pose = HeadPose3D;

    fn draw(&mut self, frame: &RgbImage, pose: Option<&HeadPose3D>) -> Result<()> {
        self.update(pose);
        self.render(frame);
        Ok(())
    }

    fn surface(&self) -> &RgbaImage {
        self.image()
    }

    fn dispose(&mut self) {
        Renderer3D::dispose(self);
    }
}

/// Cloneable stop flag for [`Session::run`].
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome<P> {
    pub frame_index: u64,
    pub face_found: bool,
    pub pose: Option<P>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub errors: u64,
}

pub struct Session<S, L, T, R>
where
    S: FrameSource,
    L: LandmarkSource,
    T: PoseTracker,
    R: OverlayRenderer<Pose = T::Pose>,
{
    source: S,
    landmarks: L,
    tracker: T,
    renderer: R,
    mirrored: bool,
    frames: u64,
    closed: bool,
}

impl<S, L, T, R> Session<S, L, T, R>
where
    S: FrameSource,
    L: LandmarkSource,
    T: PoseTracker,
    R: OverlayRenderer<Pose = T::Pose>,
{
    pub fn new(source: S, landmarks: L, tracker: T, renderer: R, mirrored: bool) -> Self {
        info!(
            landmarks = %landmarks.name(),
            width = source.width(),
            height = source.height(),
            mirrored,
            "session started"
        );
        Self { source, landmarks, tracker, renderer, mirrored, frames: 0, closed: false }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.source.width(), self.source.height(), self.mirrored)
    }

    /// One full frame. An error leaves the previous pose in place.
    pub fn step(&mut self) -> Result<StepOutcome<T::Pose>> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        let frame = self.source.capture()?;
        let geom = FrameGeometry::new(frame.width(), frame.height(), self.mirrored);
        let landmarks = self.landmarks.detect(&frame)?;
        let pose = self.tracker.track(landmarks.as_ref(), &geom)?;
        self.renderer.draw(&frame, pose.as_ref())?;

        self.frames += 1;
        Ok(StepOutcome { frame_index: self.frames, face_found: landmarks.is_some(), pose })
    }

    /// Steps until `stop` fires or `on_frame` breaks. Per-frame failures are
    /// logged and skipped. `on_frame` runs after every attempt, with `None`
    /// when the frame failed.
    pub fn run<F>(&mut self, stop: &StopSignal, mut on_frame: F) -> RunSummary
    where
        F: FnMut(&mut R, Option<&StepOutcome<T::Pose>>) -> ControlFlow<()>,
    {
        let mut summary = RunSummary::default();
        while !stop.is_stopped() && !self.closed {
            let outcome = match self.step() {
                Ok(outcome) => {
                    summary.frames += 1;
                    Some(outcome)
                }
                Err(e) => {
                    summary.errors += 1;
                    warn!(error = %e, "frame failed");
                    None
                }
            };
            if on_frame(&mut self.renderer, outcome.as_ref()).is_break() {
                break;
            }
        }
        debug!(frames = summary.frames, errors = summary.errors, "session loop ended");
        summary
    }

    /// Releases the camera and renderer resources. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.source.release();
        self.renderer.dispose();
        info!(frames = self.frames, "session closed");
    }
}

impl<S, L, T, R> Drop for Session<S, L, T, R>
where
    S: FrameSource,
    L: LandmarkSource,
    T: PoseTracker,
    R: OverlayRenderer<Pose = T::Pose>,
{
    fn drop(&mut self) {
        self.close();
    }
}

/// Frames from memory; for tests and offline runs.
#[derive(Debug)]
pub struct StillFrames {
    frames: Vec<Result<RgbImage>>,
    next: usize,
    width: u32,
    height: u32,
    released: bool,
}

impl StillFrames {
    pub fn new(width: u32, height: u32, count: usize) -> Self {
        Self::from_results((0..count).map(|_| Ok(RgbImage::new(width, height))).collect(), width, height)
    }

    /// Frames that may fail; the last entry repeats once the list runs out.
    pub fn from_results(frames: Vec<Result<RgbImage>>, width: u32, height: u32) -> Self {
        Self { frames, next: 0, width, height, released: false }
    }

    pub fn captured(&self) -> usize {
        self.next
    }
}

impl FrameSource for StillFrames {
    fn capture(&mut self) -> Result<RgbImage> {
        if self.released {
            return Err(Error::Camera("released".into()));
        }
        let i = self.next.min(self.frames.len().saturating_sub(1));
        self.next += 1;
        match self.frames.get(i) {
            Some(Ok(frame)) => Ok(frame.clone()),
            Some(Err(e)) => Err(Error::Camera(e.to_string())),
            None => Ok(RgbImage::new(self.width, self.height)),
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
