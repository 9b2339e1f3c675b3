// ============================================================================
// RENDER BACKEND: explicit render context shared by the wgpu and CPU paths
// ============================================================================
//
// The renderer never touches device state directly. It hands a backend a
// fully described frame (program, projection, effect blocks, overlays) and
// the backend executes it into one of two offscreen targets. Everything a
// draw needs is in `FrameDesc`; nothing is left bound between calls.
// ============================================================================

use image::RgbaImage;

use crate::error::Result;
use crate::mask::{HandleStyle, Mask, OutlineStyle};
use crate::ops::adjustments::EffectState;
use crate::transform::{Mat4, Point};

use super::composer::ProgramSource;

/// Masks beyond this count are drawn as overlays but not graded.
pub const MAX_MASKS: usize = 8;

pub type ProgramId = u64;

/// Row order of pixels coming back from a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowOrder {
    /// Row 0 is the top of the image (wgpu textures).
    TopDown,
    /// Row 0 is the bottom of the image (GL-style framebuffers).
    BottomUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// Viewport-sized frame for interactive display.
    Preview,
    /// Image-sized frame for export.
    Export,
}

/// Raw RGBA8 pixels read back from a target.
#[derive(Clone, Debug)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub row_order: RowOrder,
}

impl Readback {
    /// Pixels with row 0 at the top, flipping if needed.
    pub fn into_top_down(self) -> Vec<u8> {
        let mut pixels = self.pixels;
        if self.row_order == RowOrder::BottomUp {
            crate::io::flip_rows(&mut pixels, self.width, self.height);
        }
        pixels
    }
}

/// One outline ring: the mask's ellipse and the ring colour.
#[derive(Clone, Debug)]
pub struct OutlineDraw {
    pub mask: Mask,
    pub color: [f32; 4],
}

/// One handle disc in world space.
#[derive(Clone, Copy, Debug)]
pub struct HandleDraw {
    pub at: Point,
    pub with_inner: bool,
}

/// Everything needed to produce one frame.
#[derive(Clone, Debug)]
pub struct FrameDesc<'a> {
    pub target: TargetKind,
    pub program: ProgramId,
    pub width: u32,
    pub height: u32,
    pub proj: Mat4,
    pub clear: [f32; 4],
    pub global: EffectState,
    /// Effect block per rasterized mask weight, same order.
    pub locals: &'a [EffectState],
    pub outlines: &'a [OutlineDraw],
    pub handles: &'a [HandleDraw],
    pub outline_style: OutlineStyle,
    pub handle_style: HandleStyle,
}

pub trait RenderBackend {
    fn name(&self) -> &str;

    /// Largest texture edge the backend accepts.
    fn max_texture_size(&self) -> u32;

    /// Bind a new source image, releasing the previous one.
    fn upload_image(&mut self, image: &RgbaImage) -> Result<()>;

    fn release_image(&mut self);

    /// Compile and link a composite program. Atomic: on error nothing is
    /// registered and existing programs are untouched.
    fn build_program(&mut self, source: &ProgramSource) -> Result<ProgramId>;

    /// Release a program and drop every cached lookup tied to it.
    fn delete_program(&mut self, id: ProgramId);

    fn has_program(&self, id: ProgramId) -> bool;

    /// Rasterize mask weights at source-image resolution. At most
    /// [`MAX_MASKS`] masks are passed.
    fn rasterize_masks(&mut self, masks: &[Mask]) -> Result<()>;

    fn render(&mut self, frame: &FrameDesc<'_>) -> Result<()>;

    fn read_frame(&mut self, target: TargetKind) -> Result<Readback>;
}
