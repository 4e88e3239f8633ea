//! Pointer-driven editing of the 2D anchor model.

use glam::Vec2;

use crate::anchor::{ArModel, PartKind, PartUpdate};
use crate::compositor::temple_anchor_points;
use crate::pose::HeadPose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragTarget {
    /// Moves the front part's offset; the whole surface grabs it.
    Front,
    FrameAnchor(PartKind),
    EarAnchor(PartKind),
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    target: DragTarget,
    last: Vec2,
    /// Taken at pointer-down and used for the whole gesture.
    pose: HeadPose,
}

#[derive(Debug, Clone)]
pub struct Editor2D {
    hit_radius: f32,
    drag: Option<Drag>,
}

impl Default for Editor2D {
    fn default() -> Self {
        Self::new(12.0)
    }
}

impl Editor2D {
    pub fn new(hit_radius: f32) -> Self {
        Self { hit_radius, drag: None }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn target(&self) -> Option<DragTarget> {
        self.drag.map(|d| d.target)
    }

    /// What a press at `pointer` would grab. The front is grabbed anywhere, a
    /// temple only by its anchor handles. With no part selected nothing is
    /// grabbed.
    pub fn hit_test(&self, model: &ArModel, pose: &HeadPose, pointer: Vec2) -> Option<DragTarget> {
        let kind = model.editing()?;
        let Some(side) = kind.side() else {
            return Some(DragTarget::Front);
        };
        let (frame_point, ear_point) = temple_anchor_points(pose, model.part(kind), side);
        let df = pointer.distance(frame_point);
        let de = pointer.distance(ear_point);
        if df <= self.hit_radius && df <= de {
            Some(DragTarget::FrameAnchor(kind))
        } else if de <= self.hit_radius {
            Some(DragTarget::EarAnchor(kind))
        } else {
            None
        }
    }

    pub fn pointer_down(&mut self, model: &ArModel, pose: Option<&HeadPose>, pointer: Vec2) -> Option<DragTarget> {
        let pose = *pose?;
        let target = self.hit_test(model, &pose, pointer)?;
        self.drag = Some(Drag { target, last: pointer, pose });
        Some(target)
    }

    /// Applies the pointer delta since the last event, rotated into the face
    /// frame. Returns false when no drag is in progress.
    pub fn pointer_move(&mut self, model: &mut ArModel, pointer: Vec2) -> bool {
        let Some(drag) = &mut self.drag else {
            return false;
        };
        let local = drag.pose.to_face_local(pointer - drag.last);
        drag.last = pointer;

        match drag.target {
            DragTarget::Front => {
                model.front.offset += local;
                if model.auto_anchors {
                    model.snap_anchors_to_front();
                }
            }
            DragTarget::FrameAnchor(kind) => {
                model.part_mut(kind).anchor_frame += local;
                model.auto_anchors = false;
            }
            DragTarget::EarAnchor(kind) => {
                model.part_mut(kind).anchor_ear += local;
            }
        }
        true
    }

    /// Ends the gesture and records it for undo.
    pub fn pointer_up(&mut self, model: &mut ArModel) -> bool {
        if self.drag.take().is_none() {
            return false;
        }
        model.push_history();
        true
    }

    /// Multiplies the selected part's scale by `factor` and records the step.
    /// The temple anchors follow a rescaled front while auto anchors are on.
    pub fn scale(&self, model: &mut ArModel, factor: f32) -> bool {
        let Some(kind) = model.editing() else {
            return false;
        };
        if !factor.is_finite() || factor <= 0.0 || self.is_dragging() {
            return false;
        }
        let scale = model.part(kind).scale * factor;
        model.update_part(kind, PartUpdate { scale: Some(scale), ..PartUpdate::default() });
        if kind == PartKind::Front && model.auto_anchors {
            model.snap_anchors_to_front();
        }
        model.push_history();
        true
    }

    /// Drops an in-progress gesture without recording it.
    pub fn cancel(&mut self) {
        self.drag = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(angle: f32) -> HeadPose {
        HeadPose {
            position: Vec2::new(100.0, 80.0),
            width: 100.0,
            angle,
            yaw: 0.0,
            jaw_left: Vec2::new(40.0, 100.0),
            jaw_right: Vec2::new(160.0, 100.0),
        }
    }

    #[test]
    fn nothing_is_grabbed_without_a_selection() {
        let mut editor = Editor2D::default();
        let model = ArModel::default();
        assert_eq!(editor.pointer_down(&model, Some(&pose(0.0)), Vec2::ZERO), None);
        assert!(!editor.is_dragging());
    }

    #[test]
    fn front_drag_moves_offset_and_resnaps_anchors() {
        let mut editor = Editor2D::default();
        let mut model = ArModel::default();
        model.select_part(Some(PartKind::Front));
        let p = pose(0.0);

        assert_eq!(editor.pointer_down(&model, Some(&p), Vec2::new(5.0, 5.0)), Some(DragTarget::Front));
        editor.pointer_move(&mut model, Vec2::new(15.0, 5.0));
        assert!((model.front.offset.x - 0.1).abs() < 1e-6);
        assert!((model.left.anchor_frame.x - (0.1 - 0.5)).abs() < 1e-6);

        let before = model.history().len();
        assert!(editor.pointer_up(&mut model));
        assert_eq!(model.history().len(), before + 1);
    }

    #[test]
    fn anchor_deltas_follow_the_face_rotation() {
        let mut editor = Editor2D::default();
        let mut model = ArModel::default();
        model.select_part(Some(PartKind::Right));
        let p = pose(std::f32::consts::FRAC_PI_2);
        let (frame_point, _) = temple_anchor_points(&p, &model.right, crate::pose::Side::Right);

        let start = model.right.anchor_frame;
        assert_eq!(editor.pointer_down(&model, Some(&p), frame_point), Some(DragTarget::FrameAnchor(PartKind::Right)));
        // screen-down on a face rolled 90 degrees is face-local +x
        editor.pointer_move(&mut model, frame_point + Vec2::new(0.0, 10.0));
        let moved = model.right.anchor_frame - start;
        assert!((moved - Vec2::new(0.1, 0.0)).length() < 1e-5);
        assert!(!model.auto_anchors);
    }

    #[test]
    fn ear_anchor_is_grabbed_within_radius() {
        let editor = Editor2D::default();
        let mut model = ArModel::default();
        model.select_part(Some(PartKind::Left));
        let p = pose(0.0);
        let (_, ear) = temple_anchor_points(&p, &model.left, crate::pose::Side::Left);
        assert_eq!(editor.hit_test(&model, &p, ear + Vec2::new(8.0, 0.0)), Some(DragTarget::EarAnchor(PartKind::Left)));
    }

    #[test]
    fn far_press_on_a_selected_temple_grabs_nothing() {
        let mut editor = Editor2D::default();
        let mut model = ArModel::default();
        model.select_part(Some(PartKind::Left));
        let p = HeadPose { position: Vec2::new(320.0, 240.0), ..pose(0.0) };

        assert_eq!(editor.pointer_down(&model, Some(&p), Vec2::new(600.0, 20.0)), None);
        assert!(!editor.pointer_move(&mut model, Vec2::new(640.0, 20.0)));
        assert_eq!(model.left.offset, Vec2::ZERO);
        assert!(!editor.pointer_up(&mut model));
    }

    #[test]
    fn scaling_the_front_resnaps_temple_anchors() {
        let editor = Editor2D::default();
        let mut model = ArModel::default();
        model.select_part(Some(PartKind::Front));
        let before = model.history().len();

        assert!(editor.scale(&mut model, 1.2));
        assert!((model.front.scale - 1.2).abs() < 1e-6);
        assert!((model.left.anchor_frame.x - (-0.6)).abs() < 1e-6);
        assert!((model.right.anchor_frame.x - 0.6).abs() < 1e-6);
        assert_eq!(model.history().len(), before + 1);
    }

    #[test]
    fn scaling_a_temple_leaves_anchors_alone() {
        let editor = Editor2D::default();
        let mut model = ArModel::default();
        model.auto_anchors = false;
        model.select_part(Some(PartKind::Right));
        let anchor = model.right.anchor_frame;

        assert!(editor.scale(&mut model, 0.5));
        assert!((model.right.scale - 0.5).abs() < 1e-6);
        assert_eq!(model.right.anchor_frame, anchor);
        assert!(!editor.scale(&mut model, f32::NAN));
        model.select_part(None);
        assert!(!editor.scale(&mut model, 2.0));
    }

    #[test]
    fn cancelled_drag_leaves_history_alone() {
        let mut editor = Editor2D::default();
        let mut model = ArModel::default();
        model.select_part(Some(PartKind::Front));
        editor.pointer_down(&model, Some(&pose(0.0)), Vec2::ZERO);
        editor.cancel();
        assert!(!editor.pointer_up(&mut model));
        assert!(!editor.pointer_move(&mut model, Vec2::ONE));
    }
}
