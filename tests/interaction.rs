//! Gesture scenarios driven through `EditorApp<SoftwareBackend>`.

use image::RgbaImage;

use lumafe::EditorApp;
use lumafe::gpu::SoftwareBackend;
use lumafe::mask::{MIN_RADIUS, MaskKind, handle_positions, hit_test};
use lumafe::settings::EngineSettings;
use lumafe::transform::{
    Camera, Point, clip_to_screen, screen_to_world, transform_point, world_to_screen,
    world_to_screen_projection,
};

fn app() -> EditorApp<SoftwareBackend> {
    EditorApp::new(SoftwareBackend::new(), &EngineSettings::default()).unwrap()
}

fn close(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() <= tol
}

#[test]
fn pan_drag_moves_camera_by_world_delta() {
    let mut a = app();
    assert_eq!(a.controller().camera, Camera::new(0.0, 0.0, 1.0));
    a.pointer_down(400.0, 300.0).unwrap();
    a.pointer_move(450.0, 320.0).unwrap();
    a.pointer_up().unwrap();
    let cam = a.renderer().camera();
    assert!(close(cam.x, -50.0, 1e-4), "{cam:?}");
    assert!(close(cam.y, 20.0, 1e-4), "{cam:?}");
    assert_eq!(cam.zoom, 1.0);
}

#[test]
fn screen_round_trips_through_render_projection() {
    let (w, h) = (800.0, 600.0);
    for cam in [
        Camera::new(0.0, 0.0, 1.0),
        Camera::new(-123.5, 42.0, 0.37),
        Camera::new(900.0, -300.0, 4.2),
    ] {
        let proj = world_to_screen_projection(&cam, w, h);
        for (px, py) in [(0.0, 0.0), (400.0, 300.0), (799.0, 1.0), (13.25, 587.5)] {
            let world = screen_to_world(px, py, &cam, w, h);
            let clip = transform_point(&proj, world.x, world.y);
            let back = clip_to_screen(clip[0], clip[1], w, h);
            assert!(close(back.x, px, 1e-4 * w), "{px} -> {}", back.x);
            assert!(close(back.y, py, 1e-4 * h), "{py} -> {}", back.y);
            let s = world_to_screen(world.x, world.y, &cam, h);
            assert!(close(s.x, px, 1e-2) && close(s.y, py, 1e-2));
        }
    }
}

#[test]
fn wheel_keeps_point_under_cursor() {
    let mut a = app();
    a.load_image(&RgbaImage::new(64, 64)).unwrap();
    let cursor = Point::new(611.0, 77.0);
    for delta in [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, 1.0] {
        let before = screen_to_world(cursor.x, cursor.y, &a.controller().camera, 800.0, 600.0);
        a.wheel(cursor.x, cursor.y, delta).unwrap();
        let after = screen_to_world(cursor.x, cursor.y, &a.controller().camera, 800.0, 600.0);
        assert!(close(before.x, after.x, 1e-2) && close(before.y, after.y, 1e-2));
    }
}

#[test]
fn earlier_mask_wins_overlapping_hit() {
    let mut a = app();
    let first = a.add_mask(MaskKind::Circle).unwrap();
    let second = a.add_mask(MaskKind::Ellipse).unwrap();
    let masks = a.controller().masks();
    assert_eq!(masks[0].center, masks[1].center);
    let hit = hit_test(masks, masks[0].center, 1.0).unwrap();
    assert_eq!(hit.mask_id, first);
    assert_ne!(hit.mask_id, second);
}

#[test]
fn resize_never_drops_below_min_radius() {
    let mut a = app();
    let id = a.add_mask(MaskKind::Ellipse).unwrap();
    let cam = a.controller().camera;
    for _ in 0..3 {
        let m = a.controller().masks()[0].clone();
        let right = handle_positions(&m, cam.zoom).right;
        let s = world_to_screen(right.x, right.y, &cam, 600.0);
        a.pointer_down(s.x, s.y).unwrap();
        // drag far past the centre
        a.pointer_move(s.x - 400.0, s.y).unwrap();
        a.pointer_up().unwrap();
        let m = &a.controller().masks()[0];
        assert_eq!(m.id, id);
        assert!(m.rx >= MIN_RADIUS && m.ry >= MIN_RADIUS, "{m:?}");
    }
}

#[test]
fn lost_end_event_keeps_handle_grabbed() {
    let mut a = app();
    let id = a.add_mask(MaskKind::Circle).unwrap();
    let cam = a.controller().camera;
    let m = a.controller().masks()[0].clone();
    let top = handle_positions(&m, cam.zoom).top;
    let s = world_to_screen(top.x, top.y, &cam, 600.0);

    a.pointer_down(s.x, s.y).unwrap();
    a.pointer_move(s.x, s.y - 20.0).unwrap();
    // no pointer_up: the gesture stays live
    assert!(a.is_gesture_active());
    a.pointer_move(s.x, s.y - 40.0).unwrap();
    assert!(close(a.controller().masks()[0].ry, m.ry + 40.0, 1e-3));

    // the next press is the only thing that releases it
    a.pointer_down(3.0, 3.0).unwrap();
    let ry = a.controller().masks()[0].ry;
    a.pointer_move(3.0, 60.0).unwrap();
    assert_eq!(a.controller().masks()[0].ry, ry);
    a.pointer_up().unwrap();
    assert!(!a.is_gesture_active());
    assert_eq!(a.renderer().masks()[0].id, id);
}

#[test]
fn tapping_centre_toggles_handles() {
    let mut a = app();
    let id = a.add_mask(MaskKind::Circle).unwrap();
    let c = a.controller().masks()[0].center;
    let s = world_to_screen(c.x, c.y, &a.controller().camera, 600.0);
    a.pointer_down(s.x, s.y).unwrap();
    a.pointer_up().unwrap();
    let m = &a.renderer().masks()[0];
    assert_eq!(m.id, id);
    assert!(!m.outline);
    assert!(m.selected);
}

#[test]
fn pinch_zooms_about_midpoint_and_clamps() {
    let mut a = app();
    let mid = Point::new(200.0, 450.0);
    let before = screen_to_world(mid.x, mid.y, &a.controller().camera, 800.0, 600.0);
    a.pinch_start(100.0, mid).unwrap();
    a.pinch_move(250.0, mid).unwrap();
    let cam = a.renderer().camera();
    assert!(close(cam.zoom, 2.5, 1e-5));
    let after = screen_to_world(mid.x, mid.y, &cam, 800.0, 600.0);
    assert!(close(before.x, after.x, 1e-3) && close(before.y, after.y, 1e-3));
    a.pinch_move(2500.0, mid).unwrap();
    assert_eq!(a.renderer().camera().zoom, 5.0);
    a.pointer_up().unwrap();
}

#[test]
fn pinch_end_hides_current_outline() {
    let mut a = app();
    a.load_image(&RgbaImage::new(800, 600)).unwrap();
    let id = a.add_mask(MaskKind::Ellipse).unwrap();
    assert!(a.controller().masks()[0].outline);

    let mid = Point::new(400.0, 300.0);
    a.pinch_start(100.0, mid).unwrap();
    a.pinch_move(120.0, mid).unwrap();
    a.pointer_up().unwrap();
    assert_eq!(a.controller().current_mask(), Some(id));
    assert!(!a.controller().masks()[0].outline);
    assert!(!a.renderer().masks()[0].outline);
}

#[test]
fn cancelled_pinch_keeps_outline() {
    let mut a = app();
    a.load_image(&RgbaImage::new(800, 600)).unwrap();
    a.add_mask(MaskKind::Ellipse).unwrap();
    let mid = Point::new(400.0, 300.0);
    a.pinch_start(100.0, mid).unwrap();
    a.pinch_move(120.0, mid).unwrap();
    a.cancel_gesture().unwrap();
    assert!(a.controller().masks()[0].outline);
}

#[test]
fn canvas_resize_updates_viewport() {
    let mut a = app();
    a.load_image(&RgbaImage::new(40, 20)).unwrap();
    a.resize_canvas(320, 240).unwrap();
    a.reset_view_to_fit().unwrap();
    assert_eq!(a.renderer().viewport(), (320, 240));
    assert_eq!(a.controller().camera.zoom, 5.0);
    assert_eq!(a.frame_image().unwrap().dimensions(), (320, 240));
}
