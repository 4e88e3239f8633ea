use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{ApiBackend, CameraIndex, CameraInfo, RequestedFormat, RequestedFormatType},
    Camera,
};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::session::FrameSource;

pub fn list_cameras() -> Result<Vec<CameraInfo>> {
    nokhwa::query(ApiBackend::Auto).map_err(|e| Error::Camera(e.to_string()))
}

/// A webcam stream. The stream is stopped on `release()` and on drop.
pub struct CameraSource {
    camera: Option<Camera>,
    width: u32,
    height: u32,
}

impl CameraSource {
    pub fn new(index: u32) -> Result<Self> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera =
            Camera::new(CameraIndex::Index(index), requested).map_err(|e| Error::Camera(e.to_string()))?;
        camera.open_stream().map_err(|e| Error::Camera(e.to_string()))?;

        let resolution = camera.resolution();
        info!(name = %camera.info().human_name(), format = %camera.camera_format(), "opened camera");
        Ok(Self { width: resolution.width(), height: resolution.height(), camera: Some(camera) })
    }

    pub fn name(&self) -> Option<String> {
        self.camera.as_ref().map(|c| c.info().human_name())
    }
}

impl FrameSource for CameraSource {
    fn capture(&mut self) -> Result<RgbImage> {
        let camera = self.camera.as_mut().ok_or_else(|| Error::Camera("camera released".into()))?;
        let frame = camera.frame().map_err(|e| Error::Camera(e.to_string()))?;
        frame.decode_image::<RgbFormat>().map_err(|e| Error::Camera(e.to_string()))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                warn!(error = %e, "failed to stop camera stream");
            }
            info!("camera released");
        }
    }

    fn is_released(&self) -> bool {
        self.camera.is_none()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}
