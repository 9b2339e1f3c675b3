// ============================================================================
// GPU MODULE: composite rendering for LumaFE
// ============================================================================
//
// Architecture:
//   backend.rs      RenderBackend trait, frame description, readback types
//   shaders.rs      all WGSL source (inline strings)
//   composer.rs     assembles the composite program from a module list
//   context.rs      wgpu Device, Queue, adapter init
//   texture.rs      source texture, offscreen targets, mask weight array
//   compositor.rs   WgpuBackend: pipelines, passes, readback
//   software.rs     SoftwareBackend: CPU twin used headless and in tests
//   renderer.rs     top-level Renderer driving either backend
// ============================================================================

pub mod backend;
pub mod shaders;
pub mod composer;
pub mod context;
pub mod texture;
pub mod compositor;
pub mod software;
pub mod renderer;

pub use backend::{RenderBackend, RowOrder, TargetKind, MAX_MASKS};
pub use compositor::WgpuBackend;
pub use renderer::{EngineState, Renderer};
pub use software::SoftwareBackend;

/// Open the wgpu backend, or fall back to the CPU one when no adapter can
/// be created and `allow_fallback` is set.
pub fn open_backend(preferred_gpu: &str, allow_fallback: bool) -> crate::error::Result<Box<dyn RenderBackend>> {
    match WgpuBackend::new(preferred_gpu) {
        Ok(be) => Ok(Box::new(be)),
        Err(e) if allow_fallback => {
            crate::log_warn!("GPU unavailable ({}), using software backend", e);
            Ok(Box::new(SoftwareBackend::new()))
        }
        Err(e) => Err(e),
    }
}

impl RenderBackend for Box<dyn RenderBackend> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn max_texture_size(&self) -> u32 {
        (**self).max_texture_size()
    }
    fn upload_image(&mut self, image: &image::RgbaImage) -> crate::error::Result<()> {
        (**self).upload_image(image)
    }
    fn release_image(&mut self) {
        (**self).release_image()
    }
    fn build_program(&mut self, source: &composer::ProgramSource) -> crate::error::Result<backend::ProgramId> {
        (**self).build_program(source)
    }
    fn delete_program(&mut self, id: backend::ProgramId) {
        (**self).delete_program(id)
    }
    fn has_program(&self, id: backend::ProgramId) -> bool {
        (**self).has_program(id)
    }
    fn rasterize_masks(&mut self, masks: &[crate::mask::Mask]) -> crate::error::Result<()> {
        (**self).rasterize_masks(masks)
    }
    fn render(&mut self, frame: &backend::FrameDesc<'_>) -> crate::error::Result<()> {
        (**self).render(frame)
    }
    fn read_frame(&mut self, target: TargetKind) -> crate::error::Result<backend::Readback> {
        (**self).read_frame(target)
    }
}
