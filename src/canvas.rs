// ============================================================================
// CANVAS CONTROLLER: pointer / pinch / wheel gestures → camera and mask edits
// ============================================================================
//
// The controller owns the camera, the mask list and the gesture state. It
// never draws; the host (see `app.rs`) pushes its state into the renderer
// and calls `draw()` after each input.
//
// A gesture ends only on `pointer_up`. If that event never arrives the
// gesture stays active until the next `pointer_down` resets it, or until
// the host calls `cancel_gesture()`.
// ============================================================================

use crate::mask::{
    HandleKind, Hit, Mask, MaskKind, MaskList, RotateAnchor, hit_test_screen, resize, translate,
};
use crate::transform::{Camera, Point, screen_to_world};

/// Wheel zoom step per notch.
pub const WHEEL_ZOOM_FACTOR: f32 = 1.1;

/// What the current pointer gesture is doing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gesture {
    Idle,
    /// Dragging empty canvas. `last` is the previous screen position.
    Pan { last: Point },
    /// Center handle grabbed. `moved` stays false for a tap.
    MoveMask { mask_id: u32, last: Point, moved: bool },
    ResizeMask { mask_id: u32, handle: HandleKind, last: Point },
    RotateMask { mask_id: u32, anchor: RotateAnchor },
    Pinch { distance: f32 },
}

pub struct CanvasController {
    pub camera: Camera,
    masks: MaskList,
    gesture: Gesture,
    /// Mask most recently grabbed, added or selected.
    current: Option<u32>,
    canvas_w: f32,
    canvas_h: f32,
    wheel_factor: f32,
}

impl CanvasController {
    pub fn new(canvas_w: u32, canvas_h: u32) -> Self {
        Self {
            camera: Camera::default(),
            masks: MaskList::new(),
            gesture: Gesture::Idle,
            current: None,
            canvas_w: canvas_w.max(1) as f32,
            canvas_h: canvas_h.max(1) as f32,
            wheel_factor: WHEEL_ZOOM_FACTOR,
        }
    }

    pub fn with_wheel_factor(mut self, factor: f32) -> Self {
        if factor.is_finite() && factor > 1.0 {
            self.wheel_factor = factor;
        }
        self
    }

    pub fn masks(&self) -> &[Mask] {
        self.masks.as_slice()
    }

    pub fn mask_list(&self) -> &MaskList {
        &self.masks
    }

    /// Replace the mask list (e.g. from a loaded recipe).
    pub fn set_mask_list(&mut self, masks: MaskList) {
        self.masks = masks;
        self.current = None;
        self.gesture = Gesture::Idle;
    }

    pub fn current_mask(&self) -> Option<u32> {
        self.current
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn canvas_size(&self) -> (f32, f32) {
        (self.canvas_w, self.canvas_h)
    }

    fn to_world(&self, p: Point) -> Point {
        screen_to_world(p.x, p.y, &self.camera, self.canvas_w, self.canvas_h)
    }

    // ------------------------------------------------------------------
    // Pointer
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        // A new press always starts from a clean slate.
        self.gesture = Gesture::Idle;
        let at = Point::new(x, y);
        let hit = hit_test_screen(
            self.masks.as_slice(),
            x,
            y,
            &self.camera,
            self.canvas_w,
            self.canvas_h,
        );
        self.gesture = match hit {
            Some(Hit { mask_id, handle }) => {
                self.current = Some(mask_id);
                match handle {
                    HandleKind::Center => Gesture::MoveMask { mask_id, last: at, moved: false },
                    HandleKind::Rotate => match self.masks.get(mask_id) {
                        Some(mask) => Gesture::RotateMask {
                            mask_id,
                            anchor: RotateAnchor::begin(mask, self.to_world(at)),
                        },
                        None => Gesture::Idle,
                    },
                    _ => Gesture::ResizeMask { mask_id, handle, last: at },
                }
            }
            None => Gesture::Pan { last: at },
        };
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        let at = Point::new(x, y);
        let world_now = self.to_world(at);
        match self.gesture {
            Gesture::Idle | Gesture::Pinch { .. } => {}
            Gesture::Pan { last } => {
                self.camera.pan(last, at, self.canvas_w, self.canvas_h);
                self.gesture = Gesture::Pan { last: at };
            }
            Gesture::MoveMask { mask_id, last, moved } => {
                let delta = world_now - self.to_world(last);
                if let Some(mask) = self.masks.get_mut(mask_id) {
                    translate(mask, delta);
                }
                self.gesture = Gesture::MoveMask {
                    mask_id,
                    last: at,
                    moved: moved || at != last,
                };
            }
            Gesture::ResizeMask { mask_id, handle, last } => {
                let delta = world_now - self.to_world(last);
                if let Some(mask) = self.masks.get_mut(mask_id) {
                    resize(mask, handle, delta);
                }
                self.gesture = Gesture::ResizeMask { mask_id, handle, last: at };
            }
            Gesture::RotateMask { mask_id, anchor } => {
                if let Some(mask) = self.masks.get_mut(mask_id) {
                    anchor.apply(mask, world_now);
                }
            }
        }
    }

    pub fn pointer_up(&mut self) {
        match self.gesture {
            Gesture::MoveMask { mask_id, moved: false, .. } => {
                if let Some(mask) = self.masks.get_mut(mask_id) {
                    mask.outline = !mask.outline;
                }
                self.select_mask(mask_id);
            }
            Gesture::Pan { .. } | Gesture::Pinch { .. } => {
                if let Some(mask) = self.current.and_then(|id| self.masks.get_mut(id)) {
                    mask.outline = false;
                }
            }
            _ => {}
        }
        self.gesture = Gesture::Idle;
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    /// Drop the current gesture without applying end-of-gesture effects.
    /// Meant for hosts that lose focus mid-drag.
    pub fn cancel_gesture(&mut self) {
        if self.is_gesture_active() {
            crate::log_info!("Canvas: gesture {:?} cancelled by host", self.gesture);
        }
        self.gesture = Gesture::Idle;
    }

    // ------------------------------------------------------------------
    // Zoom
    // ------------------------------------------------------------------

    pub fn pinch_start(&mut self, distance: f32, _midpoint: Point) {
        self.gesture = Gesture::Pinch { distance };
    }

    /// Zoom by the ratio of finger distances about the midpoint.
    pub fn pinch_move(&mut self, distance: f32, midpoint: Point) {
        let Gesture::Pinch { distance: last } = self.gesture else { return };
        if last > 0.0 && distance > 0.0 {
            self.camera
                .zoom_about(midpoint.x, midpoint.y, distance / last, self.canvas_w, self.canvas_h);
        }
        self.gesture = Gesture::Pinch { distance };
    }

    /// One wheel notch about the cursor; negative `delta_y` zooms in.
    pub fn wheel(&mut self, x: f32, y: f32, delta_y: f32) {
        if delta_y == 0.0 {
            return;
        }
        let factor = if delta_y < 0.0 { self.wheel_factor } else { 1.0 / self.wheel_factor };
        self.camera.zoom_about(x, y, factor, self.canvas_w, self.canvas_h);
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    pub fn reset_view_to_fit(&mut self, image_w: u32, image_h: u32) {
        self.camera = Camera::fit(image_w as f32, image_h as f32, self.canvas_w, self.canvas_h);
    }

    pub fn resize_canvas(&mut self, w: u32, h: u32) {
        self.canvas_w = w.max(1) as f32;
        self.canvas_h = h.max(1) as f32;
    }

    // ------------------------------------------------------------------
    // Masks
    // ------------------------------------------------------------------

    /// Add a mask at the center of the view, select it, and return its id.
    pub fn add_mask(&mut self, kind: MaskKind) -> u32 {
        let center = self.to_world(Point::new(self.canvas_w / 2.0, self.canvas_h / 2.0));
        let id = self.masks.add(kind, center).id;
        self.select_mask(id);
        id
    }

    pub fn remove_mask(&mut self, id: u32) -> bool {
        let removed = self.masks.remove(id);
        if removed && self.current == Some(id) {
            self.current = None;
        }
        removed
    }

    pub fn select_mask(&mut self, id: u32) {
        if self.masks.get(id).is_some() {
            self.masks.select(id);
            self.current = Some(id);
        }
    }

    /// Set one local effect of a mask. False for an unknown mask or effect.
    pub fn set_mask_effect(&mut self, id: u32, name: &str, value: f32) -> bool {
        match self.masks.get_mut(id) {
            Some(mask) => mask.effects.set_named(name, value),
            None => {
                crate::log_warn!("set_mask_effect: no mask with id {}", id);
                false
            }
        }
    }

    pub fn mask_mut(&mut self, id: u32) -> Option<&mut Mask> {
        self.masks.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::handle_positions;
    use crate::ops::adjustments::Adjustment;
    use crate::transform::world_to_screen;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn pan_scenario() {
        let mut c = CanvasController::new(800, 600);
        c.pointer_down(400.0, 300.0);
        c.pointer_move(450.0, 320.0);
        c.pointer_up();
        assert!(close(c.camera.x, -50.0), "{:?}", c.camera);
        assert!(close(c.camera.y, 20.0), "{:?}", c.camera);
        assert!(close(c.camera.zoom, 1.0));
    }

    #[test]
    fn lost_pointer_up_leaves_gesture_stuck_until_next_down() {
        let mut c = CanvasController::new(800, 600);
        let id = c.add_mask(MaskKind::Circle);
        let m = c.masks()[0].clone();
        let right = handle_positions(&m, 1.0).right;
        let s = world_to_screen(right.x, right.y, &c.camera, 600.0);

        c.pointer_down(s.x, s.y);
        c.pointer_move(s.x + 10.0, s.y);
        // pointer_up never arrives
        assert!(c.is_gesture_active());
        let rx = c.masks()[0].rx;
        c.pointer_move(s.x + 30.0, s.y);
        assert!(c.masks()[0].rx > rx, "still resizing");

        // the next press resets the state and starts a pan
        c.pointer_down(5.0, 5.0);
        assert!(matches!(c.gesture(), Gesture::Pan { .. }));
        let rx = c.mask_list().get(id).unwrap().rx;
        c.pointer_move(40.0, 5.0);
        assert_eq!(c.mask_list().get(id).unwrap().rx, rx);
    }

    #[test]
    fn cancel_gesture_skips_end_effects() {
        let mut c = CanvasController::new(800, 600);
        let id = c.add_mask(MaskKind::Ellipse);
        let center = c.masks()[0].center;
        let s = world_to_screen(center.x, center.y, &c.camera, 600.0);
        c.pointer_down(s.x, s.y);
        c.cancel_gesture();
        c.pointer_up();
        assert!(!c.is_gesture_active());
        assert!(c.mask_list().get(id).unwrap().outline);
    }

    #[test]
    fn center_tap_toggles_outline_and_selects() {
        let mut c = CanvasController::new(800, 600);
        let a = c.add_mask(MaskKind::Circle);
        let b = c.add_mask(MaskKind::Circle);
        c.mask_mut(b).unwrap().center = Point::new(100.0, 100.0);
        let center = c.mask_list().get(a).unwrap().center;
        let s = world_to_screen(center.x, center.y, &c.camera, 600.0);

        c.pointer_down(s.x, s.y);
        c.pointer_up();
        let ma = c.mask_list().get(a).unwrap();
        assert!(!ma.outline);
        assert!(ma.selected);
        assert!(!c.mask_list().get(b).unwrap().selected);

        c.pointer_down(s.x, s.y);
        c.pointer_up();
        assert!(c.mask_list().get(a).unwrap().outline);
    }

    #[test]
    fn center_drag_moves_without_toggling() {
        let mut c = CanvasController::new(800, 600);
        c.camera = Camera::new(0.0, 0.0, 2.0);
        let id = c.add_mask(MaskKind::Ellipse);
        let center = c.mask_list().get(id).unwrap().center;
        let s = world_to_screen(center.x, center.y, &c.camera, 600.0);
        c.pointer_down(s.x, s.y);
        c.pointer_move(s.x + 20.0, s.y - 10.0);
        c.pointer_up();
        let m = c.mask_list().get(id).unwrap();
        // 20 screen px at zoom 2 is 10 world units; screen up is world up
        assert!(close(m.center.x, center.x + 10.0));
        assert!(close(m.center.y, center.y + 5.0));
        assert!(m.outline);
    }

    #[test]
    fn pan_end_hides_current_outline() {
        let mut c = CanvasController::new(800, 600);
        let id = c.add_mask(MaskKind::Circle);
        c.pointer_down(5.0, 5.0);
        c.pointer_up();
        assert!(!c.mask_list().get(id).unwrap().outline);
    }

    #[test]
    fn rotate_handle_rotates() {
        let mut c = CanvasController::new(800, 600);
        let id = c.add_mask(MaskKind::Ellipse);
        let m = c.mask_list().get(id).unwrap().clone();
        let rot = handle_positions(&m, 1.0).rotate;
        let s = world_to_screen(rot.x, rot.y, &c.camera, 600.0);
        c.pointer_down(s.x, s.y);
        assert!(matches!(c.gesture(), Gesture::RotateMask { .. }));
        // swing a quarter turn around the center: below → right
        let right = world_to_screen(m.center.x + 200.0, m.center.y, &c.camera, 600.0);
        c.pointer_move(right.x, right.y);
        let r = c.mask_list().get(id).unwrap().rotation;
        assert!(close(r, std::f32::consts::FRAC_PI_2), "{r}");
    }

    #[test]
    fn wheel_zooms_about_cursor() {
        let mut c = CanvasController::new(800, 600);
        let before = screen_to_world(123.0, 456.0, &c.camera, 800.0, 600.0);
        c.wheel(123.0, 456.0, -1.0);
        assert!(close(c.camera.zoom, 1.1));
        let after = screen_to_world(123.0, 456.0, &c.camera, 800.0, 600.0);
        assert!(close(before.x, after.x) && close(before.y, after.y));
        for _ in 0..100 {
            c.wheel(0.0, 0.0, -1.0);
        }
        assert_eq!(c.camera.zoom, crate::transform::MAX_ZOOM);
    }

    #[test]
    fn pinch_scales_by_distance_ratio() {
        let mut c = CanvasController::new(800, 600);
        let mid = Point::new(400.0, 300.0);
        c.pinch_start(100.0, mid);
        c.pinch_move(150.0, mid);
        assert!(close(c.camera.zoom, 1.5));
        c.pinch_move(15.0, mid);
        assert!(close(c.camera.zoom, crate::transform::MIN_ZOOM));
        c.pointer_up();
        assert!(!c.is_gesture_active());
    }

    #[test]
    fn fit_centers_image() {
        let mut c = CanvasController::new(800, 600);
        c.reset_view_to_fit(1600, 600);
        assert!(close(c.camera.zoom, 0.5));
        assert!(close(c.camera.x, 0.0));
        assert!(close(c.camera.y, (600.0 - 1200.0) / 2.0));
    }

    #[test]
    fn mask_effects_by_name() {
        let mut c = CanvasController::new(800, 600);
        let id = c.add_mask(MaskKind::Circle);
        assert!(c.set_mask_effect(id, "exposure", 1.5));
        assert!(!c.set_mask_effect(id, "glow", 1.0));
        assert!(!c.set_mask_effect(99, "exposure", 1.0));
        assert_eq!(c.mask_list().get(id).unwrap().effects.get(Adjustment::Exposure), 1.5);
        assert!(c.remove_mask(id));
        assert_eq!(c.current_mask(), None);
    }
}
