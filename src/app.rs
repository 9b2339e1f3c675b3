// ============================================================================
// EDITOR APP: input → controller → renderer → frame
// ============================================================================
//
// Every input method runs the controller, pushes the resulting camera and
// mask list into the renderer and draws one preview frame before returning.
// Hosts (a windowed shell, a test, the CLI) only ever talk to this type.
// ============================================================================

use std::path::Path;

use image::RgbaImage;

use crate::canvas::CanvasController;
use crate::error::Result;
use crate::gpu::backend::RenderBackend;
use crate::gpu::renderer::Renderer;
use crate::mask::{MaskKind, MaskList};
use crate::ops::adjustments::Adjustment;
use crate::project::EditRecipe;
use crate::settings::EngineSettings;
use crate::transform::Point;

pub struct EditorApp<B: RenderBackend> {
    renderer: Renderer<B>,
    controller: CanvasController,
}

impl<B: RenderBackend> EditorApp<B> {
    pub fn new(backend: B, settings: &EngineSettings) -> Result<Self> {
        let mut renderer = Renderer::new(backend, settings.modules.clone())?;
        renderer.set_viewport(settings.viewport_width, settings.viewport_height);
        renderer.set_clear_color(settings.clear_color);
        let (vw, vh) = renderer.viewport();
        let controller =
            CanvasController::new(vw, vh).with_wheel_factor(settings.wheel_zoom_factor);
        Ok(Self { renderer, controller })
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<B> {
        &mut self.renderer
    }

    pub fn controller(&self) -> &CanvasController {
        &self.controller
    }

    fn sync(&mut self) {
        self.renderer.set_camera(self.controller.camera);
        self.renderer.set_masks(self.controller.masks());
    }

    /// Push controller state and draw one preview frame.
    pub fn redraw(&mut self) -> Result<()> {
        self.sync();
        self.renderer.draw()
    }

    // ------------------------------------------------------------------
    // Image
    // ------------------------------------------------------------------

    /// Bind a decoded image and fit it to the canvas. The view is fitted
    /// whenever the image got bound, even if the program rebuild failed.
    pub fn load_image(&mut self, image: &RgbaImage) -> Result<()> {
        let bound = self.renderer.set_image(image);
        let (w, h) = image.dimensions();
        if self.renderer.image_size() == Some((w, h)) {
            self.controller.reset_view_to_fit(w, h);
        }
        bound?;
        self.redraw()
    }

    pub fn open(&mut self, path: &Path) -> Result<()> {
        let image = crate::io::load_image(path)?;
        self.load_image(&image)
    }

    pub fn close_image(&mut self) {
        self.renderer.clear_image();
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, x: f32, y: f32) -> Result<()> {
        self.controller.pointer_down(x, y);
        self.redraw()
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> Result<()> {
        self.controller.pointer_move(x, y);
        self.redraw()
    }

    pub fn pointer_up(&mut self) -> Result<()> {
        self.controller.pointer_up();
        self.redraw()
    }

    pub fn pinch_start(&mut self, distance: f32, midpoint: Point) -> Result<()> {
        self.controller.pinch_start(distance, midpoint);
        self.redraw()
    }

    pub fn pinch_move(&mut self, distance: f32, midpoint: Point) -> Result<()> {
        self.controller.pinch_move(distance, midpoint);
        self.redraw()
    }

    pub fn wheel(&mut self, x: f32, y: f32, delta_y: f32) -> Result<()> {
        self.controller.wheel(x, y, delta_y);
        self.redraw()
    }

    pub fn is_gesture_active(&self) -> bool {
        self.controller.is_gesture_active()
    }

    pub fn cancel_gesture(&mut self) -> Result<()> {
        self.controller.cancel_gesture();
        self.redraw()
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    pub fn resize_canvas(&mut self, w: u32, h: u32) -> Result<()> {
        self.controller.resize_canvas(w, h);
        self.renderer.set_viewport(w, h);
        self.redraw()
    }

    pub fn reset_view_to_fit(&mut self) -> Result<()> {
        if let Some((w, h)) = self.renderer.image_size() {
            self.controller.reset_view_to_fit(w, h);
        }
        self.redraw()
    }

    // ------------------------------------------------------------------
    // Masks and effects
    // ------------------------------------------------------------------

    pub fn add_mask(&mut self, kind: MaskKind) -> Result<u32> {
        let id = self.controller.add_mask(kind);
        self.redraw()?;
        Ok(id)
    }

    pub fn remove_mask(&mut self, id: u32) -> Result<bool> {
        let removed = self.controller.remove_mask(id);
        self.redraw()?;
        Ok(removed)
    }

    pub fn select_mask(&mut self, id: u32) -> Result<()> {
        self.controller.select_mask(id);
        self.redraw()
    }

    pub fn set_mask_effect(&mut self, id: u32, name: &str, value: f32) -> Result<bool> {
        let known = self.controller.set_mask_effect(id, name, value);
        self.redraw()?;
        Ok(known)
    }

    /// Replace all masks at once (CLI, recipes).
    pub fn set_mask_list(&mut self, masks: MaskList) -> Result<()> {
        self.controller.set_mask_list(masks);
        self.redraw()
    }

    pub fn set_effect(&mut self, name: &str, value: f32) -> Result<bool> {
        let known = self.renderer.set_effect(name, value);
        self.redraw()?;
        Ok(known)
    }

    pub fn set_modules(&mut self, modules: Vec<Adjustment>) -> Result<()> {
        self.renderer.set_modules(modules)?;
        self.redraw()
    }

    // ------------------------------------------------------------------
    // Recipes and output
    // ------------------------------------------------------------------

    pub fn recipe(&mut self) -> EditRecipe {
        self.sync();
        EditRecipe::from_renderer(&self.renderer)
    }

    pub fn apply_recipe(&mut self, recipe: &EditRecipe) -> Result<()> {
        recipe.apply_to(&mut self.renderer)?;
        self.controller.set_mask_list(recipe.mask_list());
        self.redraw()
    }

    pub fn frame_image(&mut self) -> Result<RgbaImage> {
        self.renderer.frame_image()
    }

    pub fn export_image(&mut self) -> Result<RgbaImage> {
        self.sync();
        self.renderer.export_image()
    }

    pub fn export_png(&mut self) -> Result<Vec<u8>> {
        self.sync();
        self.renderer.export_png()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::software::SoftwareBackend;

    fn app() -> EditorApp<SoftwareBackend> {
        EditorApp::new(SoftwareBackend::new(), &EngineSettings::default()).unwrap()
    }

    #[test]
    fn loading_fits_the_view() {
        let mut a = app();
        a.load_image(&RgbaImage::new(1600, 600)).unwrap();
        assert_eq!(a.controller().camera.zoom, 0.5);
        assert_eq!(a.renderer().camera(), a.controller().camera);
        assert_eq!(a.frame_image().unwrap().dimensions(), (800, 600));
    }

    #[test]
    fn every_input_reaches_the_renderer() {
        let mut a = app();
        a.load_image(&RgbaImage::new(800, 600)).unwrap();
        let id = a.add_mask(MaskKind::Ellipse).unwrap();
        assert_eq!(a.renderer().masks().len(), 1);
        assert!(a.set_mask_effect(id, "shadows", 40.0).unwrap());
        assert_eq!(a.renderer().masks()[0].effects.get(Adjustment::Shadows), 40.0);

        a.pointer_down(10.0, 10.0).unwrap();
        a.pointer_move(30.0, 10.0).unwrap();
        assert_eq!(a.renderer().camera(), a.controller().camera);
        a.pointer_up().unwrap();

        assert!(a.remove_mask(id).unwrap());
        assert!(a.renderer().masks().is_empty());
    }

    #[test]
    fn failed_rebuild_still_fits_the_new_image() {
        let mut a = EditorApp::new(crate::gpu::renderer::flaky::flaky(), &EngineSettings::default())
            .unwrap();
        a.load_image(&RgbaImage::new(800, 600)).unwrap();
        a.wheel(100.0, 100.0, -1.0).unwrap();
        assert!(a.controller().camera.zoom > 1.0);

        a.renderer_mut().backend_mut().fail_next = true;
        let err = a.load_image(&RgbaImage::new(1600, 600)).unwrap_err();
        assert!(err.is_build_failure());
        assert_eq!(a.renderer().image_size(), Some((1600, 600)));
        assert_eq!(a.controller().camera.zoom, 0.5);
    }

    #[test]
    fn recipe_restores_masks_into_controller() {
        let mut a = app();
        a.add_mask(MaskKind::Circle).unwrap();
        a.set_effect("contrast", 20.0).unwrap();
        let recipe = a.recipe();

        let mut b = app();
        b.apply_recipe(&recipe).unwrap();
        assert_eq!(b.controller().masks(), a.controller().masks());
        assert_eq!(b.renderer().effects().get(Adjustment::Contrast), 20.0);
        // new ids continue past the restored ones
        let id = b.add_mask(MaskKind::Circle).unwrap();
        assert_eq!(id, 2);
    }
}
