// ============================================================================
// SOFTWARE BACKEND: CPU rasterizer with the same contract as the wgpu path
// ============================================================================
//
// Used for headless export when no adapter is available and by the test
// suite. Programs are still composed and validated as WGSL (naga), so a
// program the GPU would reject is rejected here too; shading then runs the
// CPU twins from `ops/adjustments.rs` and `mask.rs`.
//
// Frames come back bottom-up, like a GL framebuffer, so the renderer's
// row-order handling is exercised on every export.
// ============================================================================

use std::collections::HashMap;

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::{EngineError, Result};
use crate::mask::{Mask, handle_color, outline_alpha, weight_map};
use crate::ops::adjustments::{Adjustment, grade};
use crate::transform::{Point, ortho_unproject, world_to_texture};

use super::backend::{FrameDesc, ProgramId, Readback, RenderBackend, RowOrder, TargetKind};
use super::composer::{ProgramSource, validate_wgsl};

/// Default edge limit, matching wgpu's default `max_texture_dimension_2d`.
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

/// Entry points every composite program must expose.
const REQUIRED_ENTRY_POINTS: [&str; 2] = ["vs_image", "fs_main"];

/// Float copy of the source image, row 0 at the top.
struct SourcePixels {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

pub struct SoftwareBackend {
    max_texture_size: u32,
    source: Option<SourcePixels>,
    /// One weight plane per rasterized mask, top-down, 8-bit quantized like
    /// an Rgba8Unorm target.
    weights: Vec<Vec<f32>>,
    programs: HashMap<ProgramId, Vec<Adjustment>>,
    next_program: ProgramId,
    preview: Option<Readback>,
    export: Option<Readback>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::with_max_texture_size(DEFAULT_MAX_TEXTURE_SIZE)
    }

    pub fn with_max_texture_size(max_texture_size: u32) -> Self {
        Self {
            max_texture_size,
            source: None,
            weights: Vec::new(),
            programs: HashMap::new(),
            next_program: 1,
            preview: None,
            export: None,
        }
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn upload_image(&mut self, image: &RgbaImage) -> Result<()> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidImage(format!("{width}x{height}")));
        }
        if width > self.max_texture_size || height > self.max_texture_size {
            return Err(EngineError::TextureTooLarge {
                width,
                height,
                max: self.max_texture_size,
            });
        }
        let texels = image
            .pixels()
            .map(|p| {
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                    p[3] as f32 / 255.0,
                ]
            })
            .collect();
        self.source = Some(SourcePixels { width, height, texels });
        self.weights.clear();
        Ok(())
    }

    fn release_image(&mut self) {
        self.source = None;
        self.weights.clear();
    }

    fn build_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        let module = validate_wgsl(&source.label, &source.wgsl)?;
        for required in REQUIRED_ENTRY_POINTS {
            if !module.entry_points.iter().any(|ep| ep.name == required) {
                return Err(EngineError::ProgramLinkFailed {
                    label: source.label.clone(),
                    log: format!("missing entry point '{required}'"),
                });
            }
        }
        let id = self.next_program;
        self.next_program += 1;
        self.programs.insert(id, source.modules.clone());
        Ok(id)
    }

    fn delete_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn has_program(&self, id: ProgramId) -> bool {
        self.programs.contains_key(&id)
    }

    fn rasterize_masks(&mut self, masks: &[Mask]) -> Result<()> {
        let src = self.source.as_ref().ok_or(EngineError::NoImage)?;
        self.weights = masks
            .iter()
            .map(|m| {
                let mut plane = weight_map(m, src.width, src.height);
                for w in &mut plane {
                    *w = (*w * 255.0).round() / 255.0;
                }
                plane
            })
            .collect();
        Ok(())
    }

    fn render(&mut self, frame: &FrameDesc<'_>) -> Result<()> {
        let src = self.source.as_ref().ok_or(EngineError::NoImage)?;
        let modules = self.programs.get(&frame.program).ok_or_else(|| {
            EngineError::ResourceUnavailable(format!("program {} is not built", frame.program))
        })?;
        if frame.width == 0 || frame.height == 0 {
            return Err(EngineError::Readback(format!(
                "empty target {}x{}",
                frame.width, frame.height
            )));
        }

        let w = frame.width as usize;
        let h = frame.height as usize;
        let graded = frame.locals.len().min(self.weights.len());
        let weights = &self.weights[..graded];
        let mut pixels = vec![0u8; w * h * 4];

        pixels
            .par_chunks_mut(w * 4)
            .enumerate()
            .for_each(|(row, dst)| {
                // Row 0 is the bottom of the target.
                let clip_y = (row as f32 + 0.5) / h as f32 * 2.0 - 1.0;
                for col in 0..w {
                    let clip_x = (col as f32 + 0.5) / w as f32 * 2.0 - 1.0;
                    let world = ortho_unproject(&frame.proj, clip_x, clip_y);
                    let mut out = shade_image(src, weights, modules, frame, world);
                    for outline in frame.outlines {
                        let extent = outline.mask.bounding_radius()
                            + frame.outline_style.half_width
                            + frame.outline_style.feather;
                        if within(world, outline.mask.center, extent) {
                            let a = outline_alpha(&outline.mask, world, &frame.outline_style);
                            let c = outline.color;
                            blend(&mut out, [c[0], c[1], c[2], c[3] * a]);
                        }
                    }
                    let extent = frame.handle_style.extent();
                    for handle in frame.handles {
                        if within(world, handle.at, extent) {
                            let c = handle_color(world, handle.at, &frame.handle_style, handle.with_inner);
                            blend(&mut out, c);
                        }
                    }
                    for (i, v) in out.iter().enumerate() {
                        dst[col * 4 + i] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                }
            });

        let readback = Readback {
            width: frame.width,
            height: frame.height,
            pixels,
            row_order: RowOrder::BottomUp,
        };
        match frame.target {
            TargetKind::Preview => self.preview = Some(readback),
            TargetKind::Export => self.export = Some(readback),
        }
        Ok(())
    }

    fn read_frame(&mut self, target: TargetKind) -> Result<Readback> {
        let frame = match target {
            TargetKind::Preview => self.preview.as_ref(),
            TargetKind::Export => self.export.as_ref(),
        };
        frame
            .cloned()
            .ok_or_else(|| EngineError::Readback(format!("no {target:?} frame has been rendered")))
    }
}

/// Composite stage for one world point: clear colour outside the image,
/// otherwise global grade then each mask's local grade mixed by weight.
fn shade_image(
    src: &SourcePixels,
    weights: &[Vec<f32>],
    modules: &[Adjustment],
    frame: &FrameDesc<'_>,
    world: Point,
) -> [f32; 4] {
    let (iw, ih) = (src.width as f32, src.height as f32);
    if world.x < 0.0 || world.y < 0.0 || world.x > iw || world.y > ih {
        return frame.clear;
    }
    let uv = world_to_texture(world.x, world.y, iw, ih);
    let s = sample_bilinear(src.width, src.height, uv, |i| src.texels[i]);
    let mut c = grade([s[0], s[1], s[2]], modules, &frame.global);
    for (plane, local) in weights.iter().zip(frame.locals) {
        let w = sample_bilinear(src.width, src.height, uv, |i| [plane[i]; 4])[0];
        if w > 0.0 {
            let g = grade(c, modules, local);
            for k in 0..3 {
                c[k] += (g[k] - c[k]) * w;
            }
        }
    }
    [c[0], c[1], c[2], s[3]]
}

/// Clamp-to-edge bilinear fetch with texel centers at half-integers.
fn sample_bilinear(width: u32, height: u32, uv: Point, fetch: impl Fn(usize) -> [f32; 4]) -> [f32; 4] {
    let x = uv.x * width as f32 - 0.5;
    let y = uv.y * height as f32 - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    let idx = |xi: f32, yi: f32| {
        let cx = (xi as i64).clamp(0, max_x) as usize;
        let cy = (yi as i64).clamp(0, max_y) as usize;
        cy * width as usize + cx
    };
    let a = fetch(idx(x0, y0));
    let b = fetch(idx(x0 + 1.0, y0));
    let c = fetch(idx(x0, y0 + 1.0));
    let d = fetch(idx(x0 + 1.0, y0 + 1.0));
    let mut out = [0.0; 4];
    for k in 0..4 {
        let top = a[k] + (b[k] - a[k]) * fx;
        let bottom = c[k] + (d[k] - c[k]) * fx;
        out[k] = top + (bottom - top) * fy;
    }
    out
}

fn within(p: Point, center: Point, extent: f32) -> bool {
    (p.x - center.x).abs() <= extent && (p.y - center.y).abs() <= extent
}

/// Straight-alpha "over", same factors as `wgpu::BlendState::ALPHA_BLENDING`.
fn blend(dst: &mut [f32; 4], src: [f32; 4]) {
    let a = src[3];
    if a <= 0.0 {
        return;
    }
    for k in 0..3 {
        dst[k] = src[k] * a + dst[k] * (1.0 - a);
    }
    dst[3] = a + dst[3] * (1.0 - a);
}
