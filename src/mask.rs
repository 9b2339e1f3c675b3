// ============================================================================
// MASKS: local-adjustment regions, handle geometry, and analytic fields
// ============================================================================
//
// A mask is a rotated, feathered ellipse in world space (source-image pixels,
// origin bottom-left). The same ellipse drives three things:
//
//   * the per-mask effect weight (feathered falloff, rasterized at image size)
//   * the on-screen outline ring (SDF band of constant screen thickness)
//   * six handles: center, four resize points, one rotate point
//
// The analytic functions at the bottom are the CPU twins of the WGSL in
// `gpu/shaders.rs`.
// ============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ops::adjustments::{EffectState, mix, smoothstep};
use crate::transform::{Camera, Point, rotate_vector, screen_to_world};

/// Radii never drop below this many world units.
pub const MIN_RADIUS: f32 = 5.0;
/// Screen distance between the ellipse top and the rotate handle.
pub const ROTATE_OFFSET_PX: f32 = 40.0;
/// Handle hit radius in screen pixels, plus touch slack.
pub const HANDLE_HIT_PX: f32 = 10.0;
pub const HANDLE_HIT_SLACK_PX: f32 = 10.0;

pub const HANDLE_RADIUS_PX: f32 = 8.0;
pub const HANDLE_INNER_RADIUS_PX: f32 = 6.0;
pub const HANDLE_FEATHER_PX: f32 = 1.0;
pub const HANDLE_SHADOW_PX: f32 = 4.0;
pub const HANDLE_SHADOW_ALPHA: f32 = 0.9;

pub const OUTLINE_WIDTH_PX: f32 = 2.0;
pub const OUTLINE_FEATHER_PX: f32 = 0.5;

pub const HANDLE_BLUE: [f32; 3] = [0.2, 0.49, 0.92];
pub const SHADOW_GRAY: f32 = 0.2;

// ============================================================================
// MASK MODEL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskKind {
    Circle,
    Ellipse,
}

impl MaskKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "circle" => Some(MaskKind::Circle),
            "ellipse" => Some(MaskKind::Ellipse),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub id: u32,
    pub kind: MaskKind,
    pub center: Point,
    pub rx: f32,
    pub ry: f32,
    /// Radians, unbounded; gestures accumulate into it.
    pub rotation: f32,
    /// Width of the soft edge in world units.
    pub feather: f32,
    pub selected: bool,
    pub outline: bool,
    /// Local grading applied inside the mask.
    pub effects: EffectState,
}

impl Mask {
    pub fn new(id: u32, kind: MaskKind, center: Point) -> Self {
        let (rx, ry) = match kind {
            MaskKind::Circle => (150.0, 150.0),
            MaskKind::Ellipse => (150.0, 100.0),
        };
        Self {
            id,
            kind,
            center,
            rx,
            ry,
            rotation: 0.0,
            feather: 30.0,
            selected: false,
            outline: true,
            effects: EffectState::default(),
        }
    }

    pub fn set_radii(&mut self, rx: f32, ry: f32) {
        self.rx = clamp_radius(rx);
        self.ry = clamp_radius(ry);
    }

    pub fn set_feather(&mut self, feather: f32) {
        self.feather = if feather.is_nan() { 0.0 } else { feather.max(0.0) };
    }

    /// Restore the geometry and effect bounds on a mask that was decoded
    /// rather than built through the setters.
    pub fn normalize(&mut self) {
        self.set_radii(self.rx, self.ry);
        self.set_feather(self.feather);
        if !self.rotation.is_finite() {
            self.rotation = 0.0;
        }
        self.effects.normalize();
    }

    /// World point → mask-local frame (unrotated, centered).
    pub fn to_local(&self, p: Point) -> Point {
        let d = p - self.center;
        rotate_vector(d.x, d.y, -self.rotation)
    }

    /// Half-extent of an axis-aligned box that contains the rotated ellipse.
    pub fn bounding_radius(&self) -> f32 {
        self.rx.max(self.ry)
    }
}

fn clamp_radius(r: f32) -> f32 {
    if r.is_nan() { MIN_RADIUS } else { r.max(MIN_RADIUS) }
}

/// Ordered mask collection with session-unique ids. Order is display and
/// hit-test priority order; it carries no other meaning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaskList {
    masks: Vec<Mask>,
    next_id: u32,
}

impl Default for MaskList {
    fn default() -> Self {
        Self { masks: Vec::new(), next_id: 1 }
    }
}

impl MaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a list from saved masks; new ids continue past the largest.
    pub fn from_masks(mut masks: Vec<Mask>) -> Self {
        masks.iter_mut().for_each(Mask::normalize);
        let next_id = masks.iter().map(|m| m.id).max().map_or(1, |m| m + 1);
        Self { masks, next_id }
    }

    /// Append a new mask and return it. Ids are never reused.
    pub fn add(&mut self, kind: MaskKind, center: Point) -> &mut Mask {
        let id = self.next_id;
        self.next_id += 1;
        self.masks.push(Mask::new(id, kind, center));
        let last = self.masks.len() - 1;
        &mut self.masks[last]
    }

    /// Remove by id, keeping the order of the rest. Returns whether a mask
    /// was removed.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.masks.len();
        self.masks.retain(|m| m.id != id);
        self.masks.len() != before
    }

    /// Mark exactly the mask with `id` as selected.
    pub fn select(&mut self, id: u32) {
        for m in &mut self.masks {
            m.selected = m.id == id;
        }
    }

    pub fn get(&self, id: u32) -> Option<&Mask> {
        self.masks.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Mask> {
        self.masks.iter_mut().find(|m| m.id == id)
    }

    pub fn as_slice(&self) -> &[Mask] {
        &self.masks
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }
}

// ============================================================================
// HANDLES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Center,
    Right,
    Left,
    Top,
    Bottom,
    Rotate,
}

impl HandleKind {
    /// Hit-test order within one mask.
    pub const ALL: [HandleKind; 6] = [
        HandleKind::Center,
        HandleKind::Right,
        HandleKind::Left,
        HandleKind::Top,
        HandleKind::Bottom,
        HandleKind::Rotate,
    ];

    pub fn is_resize(self) -> bool {
        matches!(
            self,
            HandleKind::Right | HandleKind::Left | HandleKind::Top | HandleKind::Bottom
        )
    }
}

/// World-space handle points of one mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandlePositions {
    pub center: Point,
    pub right: Point,
    pub left: Point,
    pub top: Point,
    pub bottom: Point,
    pub rotate: Point,
}

impl HandlePositions {
    pub fn get(&self, kind: HandleKind) -> Point {
        match kind {
            HandleKind::Center => self.center,
            HandleKind::Right => self.right,
            HandleKind::Left => self.left,
            HandleKind::Top => self.top,
            HandleKind::Bottom => self.bottom,
            HandleKind::Rotate => self.rotate,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (HandleKind, Point)> + '_ {
        HandleKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }
}

pub fn handle_positions(mask: &Mask, zoom: f32) -> HandlePositions {
    let at = |x: f32, y: f32| mask.center + rotate_vector(x, y, mask.rotation);
    HandlePositions {
        center: mask.center,
        right: at(mask.rx, 0.0),
        left: at(-mask.rx, 0.0),
        top: at(0.0, mask.ry),
        bottom: at(0.0, -mask.ry),
        rotate: at(0.0, -(mask.ry + ROTATE_OFFSET_PX / zoom)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hit {
    pub mask_id: u32,
    pub handle: HandleKind,
}

/// First handle within reach of `cursor` (world space). Masks are tried in
/// list order, so earlier masks win overlaps. Resize and rotate handles only
/// register while the mask's outline is shown; the center always registers.
pub fn hit_test(masks: &[Mask], cursor: Point, zoom: f32) -> Option<Hit> {
    let r = (HANDLE_HIT_PX + HANDLE_HIT_SLACK_PX) / zoom;
    let r2 = r * r;
    masks.iter().find_map(|mask| {
        let handles = handle_positions(mask, zoom);
        handles
            .iter()
            .filter(|(kind, _)| *kind == HandleKind::Center || mask.outline)
            .find(|(_, p)| {
                let d = cursor - *p;
                d.x * d.x + d.y * d.y <= r2
            })
            .map(|(handle, _)| Hit { mask_id: mask.id, handle })
    })
}

/// [`hit_test`] for a screen-space cursor.
pub fn hit_test_screen(
    masks: &[Mask],
    px: f32,
    py: f32,
    cam: &Camera,
    canvas_w: f32,
    canvas_h: f32,
) -> Option<Hit> {
    let cursor = screen_to_world(px, py, cam, canvas_w, canvas_h);
    hit_test(masks, cursor, cam.zoom)
}

// ============================================================================
// EDITS
// ============================================================================

pub fn translate(mask: &mut Mask, world_delta: Point) {
    mask.center = mask.center + world_delta;
}

/// Apply a world-space drag to a resize handle. The delta is taken into the
/// mask's local frame first, so dragging along the rotated axis resizes it.
pub fn resize(mask: &mut Mask, handle: HandleKind, world_delta: Point) {
    let local = rotate_vector(world_delta.x, world_delta.y, -mask.rotation);
    match handle {
        HandleKind::Right => mask.rx += local.x,
        HandleKind::Left => mask.rx -= local.x,
        HandleKind::Top => mask.ry += local.y,
        HandleKind::Bottom => mask.ry -= local.y,
        HandleKind::Center | HandleKind::Rotate => {}
    }
    mask.rx = clamp_radius(mask.rx);
    mask.ry = clamp_radius(mask.ry);
}

/// Angle and rotation captured when a rotate gesture starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotateAnchor {
    pub start_angle: f32,
    pub start_rotation: f32,
}

impl RotateAnchor {
    pub fn begin(mask: &Mask, cursor: Point) -> Self {
        Self {
            start_angle: angle_from(mask.center, cursor),
            start_rotation: mask.rotation,
        }
    }

    pub fn apply(&self, mask: &mut Mask, cursor: Point) {
        let now = angle_from(mask.center, cursor);
        mask.rotation = self.start_rotation + (now - self.start_angle);
    }
}

fn angle_from(center: Point, p: Point) -> f32 {
    (p.y - center.y).atan2(p.x - center.x)
}

// ============================================================================
// ANALYTIC FIELDS (CPU twins of the WGSL)
// ============================================================================

/// Effect weight at world point `p`: 1 inside, feathered to 0 at the edge.
pub fn mask_weight(mask: &Mask, p: Point) -> f32 {
    let local = mask.to_local(p);
    let d = Point::new(local.x / mask.rx, local.y / mask.ry).length();
    let inner = (1.0 - mask.feather / mask.rx.min(mask.ry)).max(0.0);
    if inner >= 1.0 {
        return if d <= 1.0 { 1.0 } else { 0.0 };
    }
    1.0 - smoothstep(inner, 1.0, d)
}

/// Approximate signed distance (world units) from `p` to the ellipse edge:
/// the normalized field value divided by its gradient length.
pub fn ellipse_distance(mask: &Mask, p: Point) -> f32 {
    let r = mask.to_local(p);
    let k = Point::new(r.x / mask.rx, r.y / mask.ry).length() - 1.0;
    let grad = Point::new(r.x / (mask.rx * mask.rx), r.y / (mask.ry * mask.ry)).length();
    k / grad.max(1e-6)
}

/// Screen-constant outline metrics converted to world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutlineStyle {
    pub half_width: f32,
    pub feather: f32,
}

impl OutlineStyle {
    pub fn for_zoom(zoom: f32) -> Self {
        Self {
            half_width: OUTLINE_WIDTH_PX * 0.5 / zoom,
            feather: OUTLINE_FEATHER_PX / zoom,
        }
    }
}

pub fn outline_alpha(mask: &Mask, p: Point, style: &OutlineStyle) -> f32 {
    let d = ellipse_distance(mask, p).abs();
    1.0 - smoothstep(style.half_width - style.feather, style.half_width + style.feather, d)
}

/// Screen-constant handle metrics converted to world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandleStyle {
    pub radius: f32,
    pub inner_radius: f32,
    pub feather: f32,
    pub shadow: f32,
    pub shadow_alpha: f32,
}

impl HandleStyle {
    pub fn for_zoom(zoom: f32) -> Self {
        Self {
            radius: HANDLE_RADIUS_PX / zoom,
            inner_radius: HANDLE_INNER_RADIUS_PX / zoom,
            feather: HANDLE_FEATHER_PX / zoom,
            shadow: HANDLE_SHADOW_PX / zoom,
            shadow_alpha: HANDLE_SHADOW_ALPHA,
        }
    }

    /// Half-size of the quad that covers disc, feather and shadow.
    pub fn extent(&self) -> f32 {
        self.radius + self.feather + self.shadow
    }
}

/// Straight-alpha RGBA of a handle disc at `p`. `with_inner` adds the blue
/// center dot (center handle only).
pub fn handle_color(p: Point, at: Point, style: &HandleStyle, with_inner: bool) -> [f32; 4] {
    let d = (p - at).length();
    let sdf = d - style.radius;
    let disc = 1.0 - smoothstep(0.0, style.feather, sdf);
    let dot = if with_inner {
        1.0 - smoothstep(0.0, style.feather, d - style.inner_radius)
    } else {
        0.0
    };
    let shadow = if sdf > 0.0 {
        (1.0 - smoothstep(0.0, style.shadow, sdf)) * style.shadow_alpha
    } else {
        0.0
    };

    let alpha = disc.max(shadow);
    if alpha <= 0.0 {
        return [0.0; 4];
    }
    let body = [
        mix(1.0, HANDLE_BLUE[0], dot),
        mix(1.0, HANDLE_BLUE[1], dot),
        mix(1.0, HANDLE_BLUE[2], dot),
    ];
    let t = disc / alpha;
    [
        body[0] * t + SHADOW_GRAY * (1.0 - t),
        body[1] * t + SHADOW_GRAY * (1.0 - t),
        body[2] * t + SHADOW_GRAY * (1.0 - t),
        alpha,
    ]
}

/// Full-resolution weight raster of one mask. Rows are top-down like the
/// source image; samples are taken at pixel centers.
pub fn weight_map(mask: &Mask, width: u32, height: u32) -> Vec<f32> {
    let w = width as usize;
    let mut out = vec![0.0f32; w * height as usize];
    if w == 0 {
        return out;
    }
    out.par_chunks_mut(w).enumerate().for_each(|(row, dst)| {
        let wy = height as f32 - (row as f32 + 0.5);
        for (col, v) in dst.iter_mut().enumerate() {
            *v = mask_weight(mask, Point::new(col as f32 + 0.5, wy));
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn list_with(n: usize) -> MaskList {
        let mut list = MaskList::new();
        for _ in 0..n {
            list.add(MaskKind::Ellipse, Point::new(250.0, 250.0));
        }
        list
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut list = list_with(3);
        assert!(list.remove(3));
        let m = list.add(MaskKind::Circle, Point::default());
        assert_eq!(m.id, 4);
        let ids: Vec<u32> = list.as_slice().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert!(!list.remove(3));
    }

    #[test]
    fn select_is_exclusive() {
        let mut list = list_with(3);
        list.select(2);
        list.select(3);
        let sel: Vec<bool> = list.as_slice().iter().map(|m| m.selected).collect();
        assert_eq!(sel, vec![false, false, true]);
    }

    #[test]
    fn from_masks_continues_ids() {
        let list = list_with(2);
        let restored = MaskList::from_masks(list.as_slice().to_vec());
        assert_eq!(restored.next_id(), 3);
    }

    #[test]
    fn handle_positions_follow_rotation() {
        let mut m = Mask::new(1, MaskKind::Ellipse, Point::new(100.0, 100.0));
        m.rotation = FRAC_PI_2;
        let h = handle_positions(&m, 2.0);
        assert!((h.right.x - 100.0).abs() < 1e-4);
        assert!((h.right.y - 250.0).abs() < 1e-4);
        // rotate handle sits (ry + 40/zoom) below the center in local space
        assert!((h.rotate.x - 220.0).abs() < 1e-3);
        assert!((h.rotate.y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn hit_test_prefers_earlier_mask() {
        let list = list_with(2);
        let hit = hit_test(list.as_slice(), Point::new(252.0, 249.0), 1.0);
        assert_eq!(hit, Some(Hit { mask_id: 1, handle: HandleKind::Center }));
    }

    #[test]
    fn resize_handles_need_outline() {
        let mut list = list_with(1);
        let right = handle_positions(&list.as_slice()[0], 1.0).right;
        assert_eq!(
            hit_test(list.as_slice(), right, 1.0).map(|h| h.handle),
            Some(HandleKind::Right)
        );
        list.get_mut(1).unwrap().outline = false;
        assert_eq!(hit_test(list.as_slice(), right, 1.0), None);
    }

    #[test]
    fn hit_radius_is_screen_constant() {
        let list = list_with(1);
        // 15 world units away: inside at zoom 1 (radius 20), outside at zoom 2 (radius 10)
        let p = Point::new(265.0, 250.0);
        assert!(hit_test(list.as_slice(), p, 1.0).is_some());
        assert!(hit_test(list.as_slice(), p, 2.0).is_none());
    }

    #[test]
    fn radii_never_drop_below_minimum() {
        let mut m = Mask::new(1, MaskKind::Ellipse, Point::default());
        m.rotation = 0.7;
        let deltas = [
            (-500.0, 3.0),
            (20.0, -900.0),
            (1e6, 1e6),
            (-3.0, -3.0),
            (f32::MAX / 4.0, 0.0),
        ];
        for handle in [HandleKind::Right, HandleKind::Left, HandleKind::Top, HandleKind::Bottom] {
            for (dx, dy) in deltas {
                resize(&mut m, handle, Point::new(dx, dy));
                assert!(m.rx >= MIN_RADIUS && m.ry >= MIN_RADIUS, "{handle:?} {m:?}");
            }
        }
    }

    #[test]
    fn resize_uses_local_frame() {
        let mut m = Mask::new(1, MaskKind::Ellipse, Point::default());
        m.rotation = FRAC_PI_2;
        // world +y is local +x after a quarter turn
        resize(&mut m, HandleKind::Right, Point::new(0.0, 10.0));
        assert!((m.rx - 160.0).abs() < 1e-3);
        assert!((m.ry - 100.0).abs() < 1e-3);
    }

    #[test]
    fn rotate_is_relative_and_unbounded() {
        let mut m = Mask::new(1, MaskKind::Circle, Point::default());
        m.rotation = 10.0;
        let anchor = RotateAnchor::begin(&m, Point::new(1.0, 0.0));
        anchor.apply(&mut m, Point::new(0.0, 1.0));
        assert!((m.rotation - (10.0 + FRAC_PI_2)).abs() < 1e-5);
    }

    #[test]
    fn weight_is_one_inside_zero_outside() {
        let m = Mask::new(1, MaskKind::Ellipse, Point::new(200.0, 200.0));
        assert_eq!(mask_weight(&m, Point::new(200.0, 200.0)), 1.0);
        assert_eq!(mask_weight(&m, Point::new(360.0, 200.0)), 0.0);
        let edge = mask_weight(&m, Point::new(340.0, 200.0));
        assert!(edge > 0.0 && edge < 1.0);
    }

    #[test]
    fn zero_feather_is_a_hard_edge() {
        let mut m = Mask::new(1, MaskKind::Circle, Point::default());
        m.set_feather(0.0);
        assert_eq!(mask_weight(&m, Point::new(149.0, 0.0)), 1.0);
        assert_eq!(mask_weight(&m, Point::new(151.0, 0.0)), 0.0);
    }

    #[test]
    fn outline_peaks_on_the_edge() {
        let m = Mask::new(1, MaskKind::Ellipse, Point::default());
        let style = OutlineStyle::for_zoom(1.0);
        assert!(outline_alpha(&m, Point::new(150.0, 0.0), &style) > 0.99);
        assert!(outline_alpha(&m, Point::new(0.0, 100.0), &style) > 0.99);
        assert_eq!(outline_alpha(&m, Point::new(155.0, 0.0), &style), 0.0);
        assert_eq!(outline_alpha(&m, Point::default(), &style), 0.0);
    }

    #[test]
    fn center_handle_has_blue_dot_and_shadow() {
        let style = HandleStyle::for_zoom(1.0);
        let at = Point::default();
        let c = handle_color(at, at, &style, true);
        assert!((c[2] - HANDLE_BLUE[2]).abs() < 1e-6 && c[3] == 1.0);
        let plain = handle_color(at, at, &style, false);
        assert_eq!(plain, [1.0, 1.0, 1.0, 1.0]);
        let shade = handle_color(Point::new(10.0, 0.0), at, &style, true);
        assert!(shade[3] > 0.0 && shade[3] < HANDLE_SHADOW_ALPHA + 1e-6);
        assert_eq!(handle_color(Point::new(50.0, 0.0), at, &style, true)[3], 0.0);
    }

    #[test]
    fn weight_map_is_top_down() {
        let mut m = Mask::new(1, MaskKind::Circle, Point::new(5.0, 15.0));
        m.set_radii(5.0, 5.0);
        m.set_feather(0.0);
        let map = weight_map(&m, 10, 20);
        // world y=15 is near the top, so row 5 of 20 is inside
        assert_eq!(map[5 * 10 + 5], 1.0);
        assert_eq!(map[15 * 10 + 5], 0.0);
    }
}
