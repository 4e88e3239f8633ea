//! Editing controller for the 3D glasses.
//!
//! Owns the parameter record and its undo stack and pushes every change into
//! the renderer it is handed. Pointer gestures:
//! - left drag on a temple gizmo: opening angle
//! - left drag elsewhere: x/y offset
//! - right drag: temple width, or temple depth with the modifier held
//! - wheel: view zoom

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anchor::History;
use crate::pose::Side;
use crate::renderer3d::Renderer3D;
use crate::scene::{ParamKey, SceneParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DragSensitivity {
    /// Offset units per pixel.
    pub pan: f32,
    /// Degrees per pixel.
    pub opening: f32,
    pub temple: f32,
    /// Zoom change per wheel step.
    pub zoom: f32,
    pub gizmo_radius: f32,
}

impl Default for DragSensitivity {
    fn default() -> Self {
        Self { pan: 0.002, opening: 0.2, temple: 0.002, zoom: 0.1, gizmo_radius: 16.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Pan,
    Gizmo(Side),
    Temple { depth: bool },
}

pub struct SceneController {
    params: SceneParams,
    history: History<SceneParams>,
    sensitivity: DragSensitivity,
    gesture: Option<(Gesture, Vec2)>,
    changed: bool,
}

impl SceneController {
    pub fn new(params: SceneParams, sensitivity: DragSensitivity, renderer: &mut Renderer3D) -> Self {
        let mut history = History::default();
        history.push(params);
        renderer.set_params(&params);
        Self { params, history, sensitivity, gesture: None, changed: false }
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    pub fn history(&self) -> &History<SceneParams> {
        &self.history
    }

    pub fn set_param(&mut self, renderer: &mut Renderer3D, key: ParamKey, value: f32) {
        if !value.is_finite() {
            return;
        }
        self.params.set(key, value);
        renderer.set_params(&self.params);
        self.history.push(self.params);
    }

    /// Replaces every parameter, e.g. after loading a product or template.
    pub fn load(&mut self, renderer: &mut Renderer3D, params: SceneParams) {
        self.params = params;
        renderer.set_params(&self.params);
        self.history.clear();
        self.history.push(self.params);
    }

    pub fn reset(&mut self, renderer: &mut Renderer3D) {
        self.params = SceneParams::default();
        renderer.set_params(&self.params);
        self.history.push(self.params);
    }

    pub fn undo(&mut self, renderer: &mut Renderer3D) -> bool {
        match self.history.undo() {
            Some(previous) => {
                self.params = previous;
                renderer.set_params(&self.params);
                true
            }
            None => false,
        }
    }

    pub fn pointer_down(&mut self, renderer: &Renderer3D, button: PointerButton, at: Vec2, modifier: bool) {
        let gesture = match button {
            PointerButton::Right => Gesture::Temple { depth: modifier },
            PointerButton::Left => renderer
                .gizmos()
                .into_iter()
                .filter(|g| g.screen.distance(at) <= self.sensitivity.gizmo_radius)
                .min_by(|a, b| a.screen.distance(at).total_cmp(&b.screen.distance(at)))
                .map(|g| Gesture::Gizmo(g.side))
                .unwrap_or(Gesture::Pan),
        };
        debug!(?gesture, "scene drag start");
        self.gesture = Some((gesture, at));
        self.changed = false;
    }

    pub fn pointer_move(&mut self, renderer: &mut Renderer3D, at: Vec2) -> bool {
        let Some((gesture, last)) = &mut self.gesture else {
            return false;
        };
        let d = at - *last;
        *last = at;
        let s = self.sensitivity;
        let p = &mut self.params;
        match *gesture {
            Gesture::Pan => {
                p.x += d.x * s.pan;
                p.y -= d.y * s.pan;
            }
            // dragging a gizmo outward opens the temples
            Gesture::Gizmo(Side::Right) => p.opening_angle += d.x * s.opening,
            Gesture::Gizmo(Side::Left) => p.opening_angle -= d.x * s.opening,
            Gesture::Temple { depth: true } => p.temple_z -= d.y * s.temple,
            Gesture::Temple { depth: false } => p.temple_x += d.x * s.temple,
        }
        renderer.set_params(&self.params);
        self.changed = true;
        true
    }

    /// Ends the drag; a drag that changed something becomes an undo step.
    pub fn pointer_up(&mut self) -> bool {
        if self.gesture.take().is_none() || !self.changed {
            return false;
        }
        self.changed = false;
        self.history.push(self.params);
        true
    }

    /// Positive steps zoom in. View only; the tracking camera is untouched.
    pub fn wheel(&mut self, renderer: &mut Renderer3D, steps: f32) {
        renderer.set_view_zoom(renderer.view_zoom() + steps * self.sensitivity.zoom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose3d::HeadPose3D;
    use crate::renderer3d::{SceneConfig, MAX_VIEW_ZOOM};
    use glam::{Quat, Vec3};
    use image::{Rgba, RgbImage, RgbaImage};
    use std::sync::Arc;

    fn setup() -> (Renderer3D, SceneController) {
        let mut renderer = Renderer3D::new(SceneConfig::default(), false);
        let controller = SceneController::new(SceneParams::default(), DragSensitivity::default(), &mut renderer);
        (renderer, controller)
    }

    #[test]
    fn set_param_reaches_renderer_and_undoes() {
        let (mut renderer, mut ctl) = setup();
        ctl.set_param(&mut renderer, ParamKey::Curvature, 0.4);
        assert_eq!(renderer.params().curvature, 0.4);
        assert!(ctl.undo(&mut renderer));
        assert_eq!(renderer.params().curvature, SceneParams::default().curvature);
        assert!(!ctl.undo(&mut renderer));
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let (mut renderer, mut ctl) = setup();
        ctl.set_param(&mut renderer, ParamKey::Scale, f32::NAN);
        assert_eq!(ctl.params().scale, 1.0);
        assert_eq!(ctl.history().len(), 1);
    }

    #[test]
    fn left_drag_off_gizmo_pans() {
        let (mut renderer, mut ctl) = setup();
        ctl.pointer_down(&renderer, PointerButton::Left, Vec2::new(10.0, 10.0), false);
        ctl.pointer_move(&mut renderer, Vec2::new(20.0, 0.0));
        assert!(ctl.pointer_up());
        let p = ctl.params();
        assert!((p.x - 0.02).abs() < 1e-6);
        assert!((p.y - (-0.02 + 0.02)).abs() < 1e-6);
        assert_eq!(ctl.history().len(), 2);
    }

    #[test]
    fn right_drag_switches_on_modifier() {
        let (mut renderer, mut ctl) = setup();
        let start = *ctl.params();
        ctl.pointer_down(&renderer, PointerButton::Right, Vec2::ZERO, true);
        ctl.pointer_move(&mut renderer, Vec2::new(50.0, -10.0));
        ctl.pointer_up();
        assert_eq!(ctl.params().temple_x, start.temple_x);
        assert!(ctl.params().temple_z > start.temple_z);

        ctl.pointer_down(&renderer, PointerButton::Right, Vec2::ZERO, false);
        ctl.pointer_move(&mut renderer, Vec2::new(50.0, -10.0));
        ctl.pointer_up();
        assert!(ctl.params().temple_x > start.temple_x);
    }

    #[test]
    fn gizmo_drag_outward_opens_either_side() {
        let (mut renderer, mut ctl) = setup();
        renderer.set_temple_texture(Some(Arc::new(RgbaImage::from_pixel(40, 4, Rgba([0, 0, 0, 255])))));
        renderer.update(Some(&HeadPose3D { position: Vec3::new(0.0, 0.0, -1.0), rotation: Quat::IDENTITY, scale: 0.3 }));
        renderer.render(&RgbImage::new(64, 48));

        for gizmo in renderer.gizmos() {
            let before = ctl.params().opening_angle;
            let outward = if gizmo.side == Side::Right { 5.0 } else { -5.0 };
            ctl.pointer_down(&renderer, PointerButton::Left, gizmo.screen, false);
            ctl.pointer_move(&mut renderer, gizmo.screen + Vec2::new(outward, 0.0));
            ctl.pointer_up();
            assert!(ctl.params().opening_angle > before, "{:?}", gizmo.side);
        }
    }

    #[test]
    fn click_without_motion_is_not_an_undo_step() {
        let (renderer, mut ctl) = setup();
        ctl.pointer_down(&renderer, PointerButton::Left, Vec2::ZERO, false);
        assert!(!ctl.pointer_up());
        assert_eq!(ctl.history().len(), 1);
    }

    #[test]
    fn wheel_zoom_is_clamped_by_renderer() {
        let (mut renderer, mut ctl) = setup();
        for _ in 0..100 {
            ctl.wheel(&mut renderer, 1.0);
        }
        assert_eq!(renderer.view_zoom(), MAX_VIEW_ZOOM);
    }
}
