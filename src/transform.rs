// ============================================================================
// TRANSFORMS: world ↔ screen ↔ texture coordinate math
// ============================================================================
//
// Spaces:
//   screen    canvas pixels, origin top-left, y down
//   world     source-image pixels, origin bottom-left, y up
//   clip      [-1, 1]², y up (what the projection matrix produces)
//   texture   [0, 1]², origin top-left (image rows are stored top-down)
//
// Everything here is pure. The camera is the only state and it is plain data.
// ============================================================================

use serde::{Deserialize, Serialize};

/// Column-major 4x4 matrix, laid out exactly as WGSL `mat4x4<f32>` expects.
pub type Mat4 = [[f32; 4]; 4];

pub const MIN_ZOOM: f32 = 0.2;
pub const MAX_ZOOM: f32 = 5.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, o: Point) -> Point {
        Point::new(self.x + o.x, self.y + o.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, o: Point) -> Point {
        Point::new(self.x - o.x, self.y - o.y)
    }
}

// ============================================================================
// CAMERA
// ============================================================================

/// World-space origin of the viewport's bottom-left corner plus a
/// world-to-screen scale. `zoom` is kept inside `[MIN_ZOOM, MAX_ZOOM]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, zoom: 1.0 }
    }
}

impl Camera {
    pub fn new(x: f32, y: f32, zoom: f32) -> Self {
        Self { x, y, zoom: clamp_zoom(zoom) }
    }

    /// Scale the zoom by `factor` while keeping the world point under the
    /// screen position `(px, py)` fixed.
    pub fn zoom_about(&mut self, px: f32, py: f32, factor: f32, canvas_w: f32, canvas_h: f32) {
        let before = screen_to_world(px, py, self, canvas_w, canvas_h);
        self.zoom = clamp_zoom(self.zoom * factor);
        let after = screen_to_world(px, py, self, canvas_w, canvas_h);
        self.x += before.x - after.x;
        self.y += before.y - after.y;
    }

    /// Translate the camera so the content under `from` ends up under `to`
    /// (both in screen pixels).
    pub fn pan(&mut self, from: Point, to: Point, canvas_w: f32, canvas_h: f32) {
        let before = screen_to_world(from.x, from.y, self, canvas_w, canvas_h);
        let after = screen_to_world(to.x, to.y, self, canvas_w, canvas_h);
        self.x -= after.x - before.x;
        self.y -= after.y - before.y;
    }

    /// Fit the whole image into the canvas and center it.
    pub fn fit(image_w: f32, image_h: f32, canvas_w: f32, canvas_h: f32) -> Self {
        if image_w <= 0.0 || image_h <= 0.0 || canvas_w <= 0.0 || canvas_h <= 0.0 {
            return Self::default();
        }
        let zoom = clamp_zoom((canvas_w / image_w).min(canvas_h / image_h));
        let view_w = canvas_w / zoom;
        let view_h = canvas_h / zoom;
        Self {
            x: (image_w - view_w) / 2.0,
            y: (image_h - view_h) / 2.0,
            zoom,
        }
    }
}

pub fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_nan() {
        return 1.0;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

// ============================================================================
// PROJECTIONS
// ============================================================================

/// Standard orthographic projection (GL convention, column-major).
pub fn ortho_projection(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let rl = right - left;
    let tb = top - bottom;
    let fnr = far - near;
    [
        [2.0 / rl, 0.0, 0.0, 0.0],
        [0.0, 2.0 / tb, 0.0, 0.0],
        [0.0, 0.0, -2.0 / fnr, 0.0],
        [-(right + left) / rl, -(top + bottom) / tb, -(far + near) / fnr, 1.0],
    ]
}

/// Projection used for interactive preview: the world rectangle
/// `[camX, camX + W/zoom] × [camY, camY + H/zoom]` fills clip space.
pub fn world_to_screen_projection(cam: &Camera, viewport_w: f32, viewport_h: f32) -> Mat4 {
    let left = cam.x;
    let bottom = cam.y;
    ortho_projection(
        left,
        left + viewport_w / cam.zoom,
        bottom,
        bottom + viewport_h / cam.zoom,
        -1.0,
        1.0,
    )
}

/// Projection used for export: world `[0, W] × [0, H]` at 1:1, camera ignored.
pub fn image_projection(image_w: f32, image_h: f32) -> Mat4 {
    ortho_projection(0.0, image_w, 0.0, image_h, -1.0, 1.0)
}

/// `m * (x, y, 0, 1)`.
pub fn transform_point(m: &Mat4, x: f32, y: f32) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (row, o) in out.iter_mut().enumerate() {
        *o = m[0][row] * x + m[1][row] * y + m[3][row];
    }
    out
}

/// Invert an orthographic projection for a clip-space point. Only valid for
/// matrices built by [`ortho_projection`] (no rotation, no perspective).
pub fn ortho_unproject(m: &Mat4, clip_x: f32, clip_y: f32) -> Point {
    Point::new((clip_x - m[3][0]) / m[0][0], (clip_y - m[3][1]) / m[1][1])
}

// ============================================================================
// POINT MAPPINGS
// ============================================================================

/// Screen pixel (top-left origin) → world (bottom-left origin).
pub fn screen_to_world(px: f32, py: f32, cam: &Camera, canvas_w: f32, canvas_h: f32) -> Point {
    let view_w = canvas_w / cam.zoom;
    let view_h = canvas_h / cam.zoom;
    Point::new(
        cam.x + (px / canvas_w) * view_w,
        cam.y + ((canvas_h - py) / canvas_h) * view_h,
    )
}

/// Exact inverse of [`screen_to_world`].
pub fn world_to_screen(wx: f32, wy: f32, cam: &Camera, canvas_h: f32) -> Point {
    Point::new((wx - cam.x) * cam.zoom, canvas_h - (wy - cam.y) * cam.zoom)
}

/// Clip-space point → screen pixel (top-left origin).
pub fn clip_to_screen(clip_x: f32, clip_y: f32, canvas_w: f32, canvas_h: f32) -> Point {
    Point::new(
        (clip_x + 1.0) * 0.5 * canvas_w,
        (1.0 - clip_y) * 0.5 * canvas_h,
    )
}

/// World → normalized texture coordinate of the source image.
pub fn world_to_texture(wx: f32, wy: f32, image_w: f32, image_h: f32) -> Point {
    Point::new(wx / image_w, 1.0 - wy / image_h)
}

pub fn rotate_vector(x: f32, y: f32, theta: f32) -> Point {
    let (s, c) = theta.sin_cos();
    Point::new(x * c - y * s, x * s + y * c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, rel: f32) {
        let tol = rel * a.abs().max(b.abs()).max(1.0);
        assert!((a - b).abs() <= tol, "{a} vs {b}");
    }

    #[test]
    fn screen_world_round_trip_through_projection() {
        let (cw, ch) = (800.0, 600.0);
        let cams = [
            Camera::new(0.0, 0.0, 1.0),
            Camera::new(-125.5, 310.25, 0.2),
            Camera::new(1024.0, -77.0, 5.0),
            Camera::new(12.0, 48.0, 1.37),
        ];
        for cam in cams {
            let proj = world_to_screen_projection(&cam, cw, ch);
            for px in [0.0, 1.0, 133.3, 400.0, 799.0, 800.0] {
                for py in [0.0, 0.5, 299.0, 599.5, 600.0] {
                    let w = screen_to_world(px, py, &cam, cw, ch);
                    let clip = transform_point(&proj, w.x, w.y);
                    assert_close(clip[3], 1.0, 1e-6);
                    let s = clip_to_screen(clip[0], clip[1], cw, ch);
                    // relative to the canvas extent
                    assert!((s.x - px).abs() <= 1e-4 * cw, "x {} vs {px}", s.x);
                    assert!((s.y - py).abs() <= 1e-4 * ch, "y {} vs {py}", s.y);
                }
            }
        }
    }

    #[test]
    fn world_to_screen_inverts_screen_to_world() {
        let cam = Camera::new(40.0, -10.0, 2.5);
        let w = screen_to_world(123.0, 456.0, &cam, 640.0, 480.0);
        let s = world_to_screen(w.x, w.y, &cam, 480.0);
        assert_close(s.x, 123.0, 1e-5);
        assert_close(s.y, 456.0, 1e-5);
    }

    #[test]
    fn zoom_about_cursor_keeps_world_point() {
        let (cw, ch) = (800.0, 600.0);
        let mut cam = Camera::new(15.0, 25.0, 1.0);
        let before = screen_to_world(210.0, 95.0, &cam, cw, ch);
        cam.zoom_about(210.0, 95.0, 1.1, cw, ch);
        let after = screen_to_world(210.0, 95.0, &cam, cw, ch);
        assert_close(before.x, after.x, 1e-5);
        assert_close(before.y, after.y, 1e-5);
        assert_close(cam.zoom, 1.1, 1e-6);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut cam = Camera::default();
        for _ in 0..100 {
            cam.zoom_about(10.0, 10.0, 1.5, 100.0, 100.0);
        }
        assert_eq!(cam.zoom, MAX_ZOOM);
        for _ in 0..100 {
            cam.zoom_about(10.0, 10.0, 0.5, 100.0, 100.0);
        }
        assert_eq!(cam.zoom, MIN_ZOOM);
        assert_eq!(clamp_zoom(f32::NAN), 1.0);
    }

    #[test]
    fn fit_centers_image() {
        let cam = Camera::fit(1000.0, 500.0, 800.0, 600.0);
        assert_close(cam.zoom, 0.8, 1e-6);
        assert_close(cam.x, 0.0, 1e-4);
        // view height 750 world units, image 500 → 125 below
        assert_close(cam.y, -125.0, 1e-4);
    }

    #[test]
    fn rotate_quarter_turn() {
        let p = rotate_vector(1.0, 0.0, std::f32::consts::FRAC_PI_2);
        assert!(p.x.abs() < 1e-6);
        assert_close(p.y, 1.0, 1e-6);
    }

    #[test]
    fn texture_coords_flip_y() {
        let t = world_to_texture(25.0, 0.0, 100.0, 50.0);
        assert_eq!(t, Point::new(0.25, 1.0));
        let t = world_to_texture(100.0, 50.0, 100.0, 50.0);
        assert_eq!(t, Point::new(1.0, 0.0));
    }

    #[test]
    fn unproject_inverts_ortho() {
        let m = image_projection(100.0, 50.0);
        let c = transform_point(&m, 30.0, 20.0);
        let p = ortho_unproject(&m, c[0], c[1]);
        assert_close(p.x, 30.0, 1e-5);
        assert_close(p.y, 20.0, 1e-5);
    }
}
