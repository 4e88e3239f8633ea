#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgba, RgbaImage};
    use rusty_glasses::editor3d::{DragSensitivity, SceneController};
    use rusty_glasses::landmarks::{indices, ScriptedLandmarks};
    use rusty_glasses::pose3d::{CameraModel, Pose3DConfig, PoseTracker3D};
    use rusty_glasses::preprocess::{deskew, DeskewConfig};
    use rusty_glasses::renderer3d::{Renderer3D, SceneConfig};
    use rusty_glasses::scene::{ParamKey, SceneParams};
    use rusty_glasses::session::{FrameSource, OverlayRenderer, Session, StillFrames};
    use rusty_glasses::types::{Landmarks, Point3D};

    fn frontal_face() -> Landmarks {
        let mut points = vec![Point3D::new(0.5, 0.5, 0.0); indices::MESH_POINTS];
        points[indices::EYE_OUTER_IMAGE_LEFT] = Point3D::new(0.4, 0.5, 0.0);
        points[indices::EYE_OUTER_IMAGE_RIGHT] = Point3D::new(0.6, 0.5, 0.0);
        points[indices::CHIN] = Point3D::new(0.5, 0.7, 0.0);
        points[indices::FOREHEAD_TOP] = Point3D::new(0.5, 0.3, 0.0);
        Landmarks::new(points)
    }

    /// A red cutout lying slightly askew, as a user upload would.
    fn upload() -> Arc<RgbaImage> {
        let mut img = RgbaImage::new(120, 60);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let tilt = (x as f32 - 60.0) * 0.05;
            if (y as f32 - 30.0 - tilt).abs() < 12.0 && (10..110).contains(&x) {
                *px = Rgba([255, 0, 0, 255]);
            }
        }
        Arc::new(deskew(&img, &DeskewConfig::default()).image)
    }

    fn session(script: Vec<Option<Landmarks>>) -> Session<StillFrames, ScriptedLandmarks, PoseTracker3D, Renderer3D> {
        let mut renderer = Renderer3D::new(SceneConfig::default(), false);
        renderer.set_front_texture(Some(upload()));
        let tracker = PoseTracker3D::new(CameraModel::default(), Pose3DConfig::default());
        Session::new(StillFrames::new(64, 48, 4), ScriptedLandmarks::new(script), tracker, renderer, false)
    }

    #[test]
    fn glasses_appear_once_a_face_is_found() {
        let mut s = session(vec![None, Some(frontal_face())]);

        let first = s.step().unwrap();
        assert!(first.pose.is_none());
        assert_eq!(s.renderer().surface().get_pixel(32, 24).0, [0, 0, 0, 255]);

        let second = s.step().unwrap();
        let pose = second.pose.unwrap();
        assert!(pose.position.z < 0.0);
        assert_eq!(s.renderer().surface().get_pixel(32, 24).0, [255, 0, 0, 255]);
        assert_eq!(s.renderer().surface().dimensions(), (64, 48));
    }

    #[test]
    fn edits_between_frames_show_up_on_the_next_one() {
        let mut s = session(vec![Some(frontal_face())]);
        s.step().unwrap();

        let mut controller = SceneController::new(SceneParams::default(), DragSensitivity::default(), s.renderer_mut());
        controller.set_param(s.renderer_mut(), ParamKey::X, 5.0);
        s.step().unwrap();
        assert_eq!(s.renderer().params().x, 5.0);
        assert_eq!(s.renderer().surface().get_pixel(32, 24).0, [0, 0, 0, 255]);

        assert!(controller.undo(s.renderer_mut()));
        s.step().unwrap();
        assert_eq!(s.renderer().surface().get_pixel(32, 24).0, [255, 0, 0, 255]);
    }

    #[test]
    fn closing_disposes_the_scene() {
        let mut s = session(vec![Some(frontal_face())]);
        s.step().unwrap();
        s.close();
        assert!(s.renderer().is_disposed());
        assert!(!s.renderer().has_front());
        assert!(s.source().is_released());
    }
}
