//! The 2D anchor model: where each glasses part sits relative to the head pose.
//!
//! Offsets are in pose-width units. Temple frame anchors are relative to the
//! head pose origin, ear anchors to the matching jaw point.

use std::collections::VecDeque;
use std::sync::Arc;

use glam::Vec2;
use image::RgbaImage;
use tracing::debug;

use crate::ar_config::{ArConfig, ArParams, FrontParams, PurchaseType, TempleParams, XY};
use crate::pose::Side;

pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Front,
    Left,
    Right,
}

impl PartKind {
    pub const ALL: [PartKind; 3] = [PartKind::Front, PartKind::Left, PartKind::Right];

    pub fn side(self) -> Option<Side> {
        match self {
            PartKind::Front => None,
            PartKind::Left => Some(Side::Left),
            PartKind::Right => Some(Side::Right),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PartConfig {
    pub image: Option<Arc<RgbaImage>>,
    pub remote_url: Option<String>,
    pub offset: Vec2,
    pub scale: f32,
    pub anchor_frame: Vec2,
    pub anchor_ear: Vec2,
}

/// Fields to merge into one part. `None` leaves the field alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartUpdate {
    pub offset: Option<Vec2>,
    pub scale: Option<f32>,
    pub anchor_frame: Option<Vec2>,
    pub anchor_ear: Option<Vec2>,
}

/// A remote image the model is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub part: PartKind,
    pub url: String,
}

/// Bounded undo stack. Oldest snapshots fall off the front.
#[derive(Debug, Clone)]
pub struct History<T> {
    snapshots: VecDeque<T>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self { snapshots: VecDeque::with_capacity(HISTORY_LIMIT) }
    }
}

impl<T: Clone> History<T> {
    pub fn push(&mut self, snapshot: T) {
        if self.snapshots.len() == HISTORY_LIMIT {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// Drops the newest snapshot and returns the one before it.
    pub fn undo(&mut self) -> Option<T> {
        if self.snapshots.len() < 2 {
            return None;
        }
        self.snapshots.pop_back();
        self.snapshots.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.snapshots.iter()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[derive(Debug, Clone)]
pub struct ArModel {
    pub front: PartConfig,
    pub left: PartConfig,
    pub right: PartConfig,
    pub auto_anchors: bool,
    pub purchase_type: Option<PurchaseType>,
    editing: Option<PartKind>,
    history: History<ArParams>,
}

impl Default for ArModel {
    fn default() -> Self {
        let mut model = Self {
            front: PartConfig { offset: Vec2::new(0.0, -0.05), scale: 1.0, ..PartConfig::default() },
            left: PartConfig { scale: 1.0, anchor_frame: Vec2::new(-0.5, -0.05), ..PartConfig::default() },
            right: PartConfig { scale: 1.0, anchor_frame: Vec2::new(0.5, -0.05), ..PartConfig::default() },
            auto_anchors: true,
            purchase_type: None,
            editing: None,
            history: History::default(),
        };
        model.snap_anchors_to_front();
        model
    }
}

impl ArModel {
    pub fn part(&self, kind: PartKind) -> &PartConfig {
        match kind {
            PartKind::Front => &self.front,
            PartKind::Left => &self.left,
            PartKind::Right => &self.right,
        }
    }

    pub fn part_mut(&mut self, kind: PartKind) -> &mut PartConfig {
        match kind {
            PartKind::Front => &mut self.front,
            PartKind::Left => &mut self.left,
            PartKind::Right => &mut self.right,
        }
    }

    pub fn update_part(&mut self, kind: PartKind, update: PartUpdate) {
        let part = self.part_mut(kind);
        if let Some(offset) = update.offset {
            part.offset = offset;
        }
        if let Some(scale) = update.scale.filter(|s| *s > 0.0) {
            part.scale = scale;
        }
        if let Some(anchor) = update.anchor_frame {
            part.anchor_frame = anchor;
        }
        if let Some(anchor) = update.anchor_ear {
            part.anchor_ear = anchor;
        }
    }

    /// Puts the temple frame anchors on the left/right edge of the front part.
    pub fn snap_anchors_to_front(&mut self) {
        let half = self.front.scale / 2.0;
        let at = self.front.offset;
        self.left.anchor_frame = Vec2::new(at.x - half, at.y);
        self.right.anchor_frame = Vec2::new(at.x + half, at.y);
    }

    pub fn select_part(&mut self, part: Option<PartKind>) {
        self.editing = part;
    }

    pub fn editing(&self) -> Option<PartKind> {
        self.editing
    }

    /// Back to factory defaults, images included.
    pub fn clear_all(&mut self) {
        let history = std::mem::take(&mut self.history);
        *self = ArModel { history, ..ArModel::default() };
        debug!("anchor model cleared");
    }

    pub fn set_part_image(&mut self, kind: PartKind, image: Option<Arc<RgbaImage>>, remote_url: Option<String>) {
        let part = self.part_mut(kind);
        part.image = image;
        part.remote_url = remote_url;
    }

    /// Attaches a decoded remote image, unless the part has since moved on to a
    /// different URL.
    pub fn attach_remote_image(&mut self, kind: PartKind, url: &str, image: Arc<RgbaImage>) -> bool {
        let part = self.part_mut(kind);
        if part.remote_url.as_deref() != Some(url) {
            return false;
        }
        part.image = Some(image);
        true
    }

    pub fn params(&self) -> ArParams {
        let temple = |p: &PartConfig| TempleParams {
            x: p.offset.x,
            y: p.offset.y,
            scale: p.scale,
            anchor_frame: p.anchor_frame.into(),
            anchor_ear: p.anchor_ear.into(),
        };
        ArParams {
            front_params: FrontParams { x: self.front.offset.x, y: self.front.offset.y, scale: self.front.scale },
            left_params: temple(&self.left),
            right_params: temple(&self.right),
            auto_anchors: self.auto_anchors,
        }
    }

    pub fn apply_params(&mut self, params: &ArParams) {
        self.front.offset = Vec2::new(params.front_params.x, params.front_params.y);
        self.front.scale = params.front_params.scale;
        for (part, p) in [(&mut self.left, &params.left_params), (&mut self.right, &params.right_params)] {
            part.offset = Vec2::new(p.x, p.y);
            part.scale = p.scale;
            part.anchor_frame = p.anchor_frame.into();
            part.anchor_ear = p.anchor_ear.into();
        }
        self.auto_anchors = params.auto_anchors;
    }

    pub fn push_history(&mut self) {
        let snapshot = self.params();
        self.history.push(snapshot);
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.apply_params(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn history(&self) -> &History<ArParams> {
        &self.history
    }

    pub fn get_config(&self) -> ArConfig {
        let params = self.params();
        ArConfig {
            front: self.front.remote_url.clone(),
            left: self.left.remote_url.clone(),
            right: self.right.remote_url.clone(),
            front_params: Some(params.front_params),
            left_params: Some(params.left_params),
            right_params: Some(params.right_params),
            auto_anchors: Some(params.auto_anchors),
            purchase_type: self.purchase_type,
        }
    }

    /// Replaces the model with `config`. Numbers apply now; the returned list
    /// names the images still to be fetched. A part keeps its bitmap only if
    /// its URL did not change.
    pub fn apply_config(&mut self, config: &ArConfig) -> Vec<PendingImage> {
        let defaults = ArModel::default().params();
        self.apply_params(&ArParams {
            front_params: config.front_params.unwrap_or(defaults.front_params),
            left_params: config.left_params.unwrap_or(defaults.left_params),
            right_params: config.right_params.unwrap_or(defaults.right_params),
            auto_anchors: config.auto_anchors.unwrap_or(defaults.auto_anchors),
        });
        self.purchase_type = config.purchase_type;

        let mut pending = Vec::new();
        for (kind, url) in [
            (PartKind::Front, &config.front),
            (PartKind::Left, &config.left),
            (PartKind::Right, &config.right),
        ] {
            let part = self.part_mut(kind);
            if part.remote_url != *url {
                part.image = None;
                part.remote_url = url.clone();
            }
            if let Some(url) = url {
                if part.image.is_none() {
                    pending.push(PendingImage { part: kind, url: url.clone() });
                }
            }
        }

        self.history.clear();
        self.push_history();
        pending
    }
}

impl From<XY> for PartUpdate {
    fn from(offset: XY) -> Self {
        PartUpdate { offset: Some(offset.into()), ..PartUpdate::default() }
    }
}
