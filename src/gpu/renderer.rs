// ============================================================================
// RENDERER: frame driver over a render backend
// ============================================================================
//
// State setters are plain mutations. Nothing is drawn until the host calls
// `draw()` (preview) or `export_image()` (full resolution), so a batch of
// setter calls costs one frame.
//
// Program lifecycle: the composite program is rebuilt when the module list
// changes or a new image is bound. A rebuild is atomic; on failure the
// previous program stays bound and the error is returned.
// ============================================================================

use image::RgbaImage;

use crate::error::{EngineError, Result};
use crate::mask::{HandleKind, HandleStyle, Mask, OutlineStyle, handle_positions, weight_map};
use crate::ops::adjustments::{Adjustment, EffectState};
use crate::transform::{Camera, image_projection, world_to_screen_projection};

use super::backend::{FrameDesc, HandleDraw, MAX_MASKS, OutlineDraw, ProgramId, RenderBackend, TargetKind};
use super::composer::{compose, resolve_names};

pub const OUTLINE_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
pub const SELECTED_OUTLINE_COLOR: [f32; 4] = [1.0, 0.85, 0.1, 1.0];
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.12, 0.12, 0.12, 1.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No image bound; `draw()` does nothing.
    Idle,
    /// Image bound and a program built.
    Ready,
}

pub struct Renderer<B: RenderBackend> {
    backend: B,
    state: EngineState,
    image_size: Option<(u32, u32)>,

    modules: Vec<Adjustment>,
    program: ProgramId,

    camera: Camera,
    masks: Vec<Mask>,
    weights_dirty: bool,
    warned_mask_cap: bool,
    effects: EffectState,

    viewport: (u32, u32),
    clear_color: [f32; 4],
}

impl<B: RenderBackend> Renderer<B> {
    /// Build the initial program. Failure here is fatal and propagates.
    pub fn new(mut backend: B, modules: Vec<Adjustment>) -> Result<Self> {
        let program = backend.build_program(&compose(&modules))?;
        crate::log_info!(
            "Renderer: '{}' backend ready, {} module(s)",
            backend.name(),
            modules.len()
        );
        Ok(Self {
            backend,
            state: EngineState::Idle,
            image_size: None,
            modules,
            program,
            camera: Camera::default(),
            masks: Vec::new(),
            weights_dirty: false,
            warned_mask_cap: false,
            effects: EffectState::default(),
            viewport: (800, 600),
            clear_color: DEFAULT_CLEAR_COLOR,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn modules(&self) -> &[Adjustment] {
        &self.modules
    }

    pub fn program_id(&self) -> ProgramId {
        self.program
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    pub fn effects(&self) -> &EffectState {
        &self.effects
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    // ------------------------------------------------------------------
    // State setters
    // ------------------------------------------------------------------

    /// Bind a new source image, replacing the previous one, and rebuild the
    /// program for it.
    pub fn set_image(&mut self, image: &RgbaImage) -> Result<()> {
        self.backend.upload_image(image)?;
        self.image_size = Some(image.dimensions());
        self.state = EngineState::Ready;
        self.weights_dirty = true;
        crate::log_info!("Renderer: bound {}x{} image", image.width(), image.height());
        let modules = self.modules.clone();
        self.rebuild_program(modules)
    }

    pub fn clear_image(&mut self) {
        self.backend.release_image();
        self.image_size = None;
        self.state = EngineState::Idle;
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// Store a snapshot of the mask list. Weights are re-rasterized on the
    /// next frame only if geometry or order changed.
    pub fn set_masks(&mut self, masks: &[Mask]) {
        let graded = masks.len().min(MAX_MASKS);
        if masks.len() > MAX_MASKS && !self.warned_mask_cap {
            crate::log_warn!(
                "Renderer: {} masks, only the first {} are graded",
                masks.len(),
                MAX_MASKS
            );
            self.warned_mask_cap = true;
        }
        let changed = self.masks.len().min(MAX_MASKS) != graded
            || self
                .masks
                .iter()
                .zip(masks)
                .take(graded)
                .any(|(a, b)| !same_geometry(a, b));
        self.weights_dirty |= changed;
        self.masks = masks.to_vec();
    }

    /// Set one global effect by name. Unknown names are logged and ignored.
    pub fn set_effect(&mut self, name: &str, value: f32) -> bool {
        self.effects.set_named(name, value)
    }

    pub fn set_effects(&mut self, effects: EffectState) {
        self.effects = effects;
    }

    /// Replace the module chain. On failure the previous program and chain
    /// stay active.
    pub fn set_modules(&mut self, modules: Vec<Adjustment>) -> Result<()> {
        self.rebuild_program(modules)
    }

    /// String-keyed [`set_modules`](Self::set_modules); unknown names are
    /// skipped with a warning.
    pub fn set_modules_named<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.rebuild_program(resolve_names(names))
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn rebuild_program(&mut self, modules: Vec<Adjustment>) -> Result<()> {
        let source = compose(&modules);
        match self.backend.build_program(&source) {
            Ok(id) => {
                let old = std::mem::replace(&mut self.program, id);
                self.backend.delete_program(old);
                self.modules = modules;
                Ok(())
            }
            Err(e) => {
                crate::log_err!("Renderer: keeping previous program, build failed: {}", e);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    fn refresh_weights(&mut self) -> Result<()> {
        if self.weights_dirty {
            let graded = &self.masks[..self.masks.len().min(MAX_MASKS)];
            self.backend.rasterize_masks(graded)?;
            self.weights_dirty = false;
        }
        Ok(())
    }

    fn graded_effects(&self) -> Vec<EffectState> {
        self.masks.iter().take(MAX_MASKS).map(|m| m.effects).collect()
    }

    /// Render the interactive preview. No-op while Idle.
    pub fn draw(&mut self) -> Result<()> {
        if self.state == EngineState::Idle {
            return Ok(());
        }
        self.refresh_weights()?;

        let zoom = self.camera.zoom;
        let mut outlines = Vec::new();
        let mut handles = Vec::new();
        for mask in &self.masks {
            if mask.outline {
                outlines.push(OutlineDraw {
                    mask: mask.clone(),
                    color: if mask.selected { SELECTED_OUTLINE_COLOR } else { OUTLINE_COLOR },
                });
            }
            for (kind, at) in handle_positions(mask, zoom).iter() {
                if kind == HandleKind::Center || mask.outline {
                    handles.push(HandleDraw {
                        at,
                        with_inner: kind == HandleKind::Center,
                    });
                }
            }
        }

        let locals = self.graded_effects();
        let (vw, vh) = self.viewport;
        let frame = FrameDesc {
            target: TargetKind::Preview,
            program: self.program,
            width: vw,
            height: vh,
            proj: world_to_screen_projection(&self.camera, vw as f32, vh as f32),
            clear: self.clear_color,
            global: self.effects,
            locals: &locals,
            outlines: &outlines,
            handles: &handles,
            outline_style: OutlineStyle::for_zoom(zoom),
            handle_style: HandleStyle::for_zoom(zoom),
        };
        self.backend.render(&frame)
    }

    /// Last preview frame, row 0 at the top.
    pub fn frame_image(&mut self) -> Result<RgbaImage> {
        let rb = self.backend.read_frame(TargetKind::Preview)?;
        let (w, h) = (rb.width, rb.height);
        RgbaImage::from_raw(w, h, rb.into_top_down())
            .ok_or_else(|| EngineError::Readback("preview size mismatch".into()))
    }

    /// Full-resolution render of the whole image at 1:1, camera ignored,
    /// without outlines or handles.
    pub fn export_image(&mut self) -> Result<RgbaImage> {
        let (w, h) = self.image_size.ok_or(EngineError::NoImage)?;
        self.refresh_weights()?;
        let locals = self.graded_effects();
        let frame = FrameDesc {
            target: TargetKind::Export,
            program: self.program,
            width: w,
            height: h,
            proj: image_projection(w as f32, h as f32),
            clear: [0.0; 4],
            global: self.effects,
            locals: &locals,
            outlines: &[],
            handles: &[],
            outline_style: OutlineStyle::for_zoom(1.0),
            handle_style: HandleStyle::for_zoom(1.0),
        };
        self.backend.render(&frame)?;
        let rb = self.backend.read_frame(TargetKind::Export)?;
        if rb.width != w || rb.height != h {
            return Err(EngineError::Readback(format!(
                "expected {w}x{h}, got {}x{}",
                rb.width, rb.height
            )));
        }
        RgbaImage::from_raw(w, h, rb.into_top_down())
            .ok_or_else(|| EngineError::Readback("export size mismatch".into()))
    }

    /// [`export_image`](Self::export_image) encoded as PNG.
    pub fn export_png(&mut self) -> Result<Vec<u8>> {
        let img = self.export_image()?;
        crate::io::encode_png(&img)
    }

    /// CPU weight raster (top-down, image resolution) of one mask.
    pub fn mask_weight_map(&self, id: u32) -> Option<Vec<f32>> {
        let (w, h) = self.image_size?;
        let mask = self.masks.iter().find(|m| m.id == id)?;
        Some(weight_map(mask, w, h))
    }
}

fn same_geometry(a: &Mask, b: &Mask) -> bool {
    a.id == b.id
        && a.center == b.center
        && a.rx == b.rx
        && a.ry == b.ry
        && a.rotation == b.rotation
        && a.feather == b.feather
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::software::SoftwareBackend;
    use crate::mask::MaskKind;
    use crate::ops::adjustments::DEFAULT_PIPELINE;
    use crate::transform::Point;

    use super::flaky::flaky;

    fn flat(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([v, v, v, 255]))
    }

    #[test]
    fn initial_build_failure_is_fatal() {
        let mut be = flaky();
        be.fail_next = true;
        assert!(Renderer::new(be, DEFAULT_PIPELINE.to_vec()).is_err());
    }

    #[test]
    fn failed_rebuild_keeps_previous_program() {
        let mut r = Renderer::new(flaky(), DEFAULT_PIPELINE.to_vec()).unwrap();
        r.set_image(&flat(8, 8, 90)).unwrap();
        let before = r.program_id();

        r.backend_mut().fail_next = true;
        let err = r.set_modules(vec![Adjustment::Brightness]).unwrap_err();
        assert!(err.is_build_failure());
        assert_eq!(r.program_id(), before);
        assert_eq!(r.modules(), &DEFAULT_PIPELINE[..]);
        assert!(r.backend().has_program(before));

        // session stays usable
        r.draw().unwrap();
        r.export_image().unwrap();
    }

    #[test]
    fn successful_rebuild_releases_old_program() {
        let mut r = Renderer::new(flaky(), DEFAULT_PIPELINE.to_vec()).unwrap();
        let first = r.program_id();
        r.set_modules_named(&["contrast", "nope"]).unwrap();
        assert_eq!(r.modules(), &[Adjustment::Contrast]);
        assert!(r.backend().deleted.contains(&first));
        assert!(!r.backend().has_program(first));
    }

    #[test]
    fn draw_is_a_noop_while_idle() {
        let mut r = Renderer::new(SoftwareBackend::new(), DEFAULT_PIPELINE.to_vec()).unwrap();
        assert_eq!(r.state(), EngineState::Idle);
        r.draw().unwrap();
        assert!(r.frame_image().is_err());
        assert!(matches!(r.export_image(), Err(EngineError::NoImage)));
    }

    #[test]
    fn export_ignores_camera() {
        let img = RgbaImage::from_fn(16, 8, |x, y| image::Rgba([x as u8 * 9, y as u8 * 20, 77, 255]));
        let mut r = Renderer::new(SoftwareBackend::new(), DEFAULT_PIPELINE.to_vec()).unwrap();
        r.set_image(&img).unwrap();
        r.set_camera(Camera::new(-40.0, 13.0, 3.5));
        let out = r.export_image().unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn preview_shows_camera_window() {
        let mut r = Renderer::new(SoftwareBackend::new(), DEFAULT_PIPELINE.to_vec()).unwrap();
        r.set_image(&flat(10, 10, 200)).unwrap();
        r.set_clear_color([0.0, 0.0, 0.0, 1.0]);
        r.set_viewport(20, 10);
        r.set_camera(Camera::new(0.0, 0.0, 1.0));
        r.draw().unwrap();
        let frame = r.frame_image().unwrap();
        assert_eq!(frame.dimensions(), (20, 10));
        // image occupies the left half, clear colour the right
        assert_eq!(frame.get_pixel(2, 5).0, [200, 200, 200, 255]);
        assert_eq!(frame.get_pixel(17, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn unknown_effect_is_ignored() {
        let mut r = Renderer::new(SoftwareBackend::new(), DEFAULT_PIPELINE.to_vec()).unwrap();
        assert!(!r.set_effect("clarity", 20.0));
        assert!(r.effects().is_identity());
        assert!(r.set_effect("exposure", 1.0));
    }

    #[test]
    fn weight_map_available_per_mask() {
        let mut r = Renderer::new(SoftwareBackend::new(), DEFAULT_PIPELINE.to_vec()).unwrap();
        r.set_image(&flat(32, 32, 10)).unwrap();
        let m = Mask::new(4, MaskKind::Circle, Point::new(16.0, 16.0));
        r.set_masks(&[m]);
        let map = r.mask_weight_map(4).unwrap();
        assert_eq!(map.len(), 32 * 32);
        assert_eq!(map[16 * 32 + 16], 1.0);
        assert!(r.mask_weight_map(5).is_none());
    }
}
