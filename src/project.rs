// ============================================================================
// EDIT RECIPES: the non-destructive edit state of one image (.lfe)
// ============================================================================
//
// A recipe holds everything needed to reproduce an export from the original
// file: module chain, global effects, masks with their local effects. The
// source pixels are never stored.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::gpu::backend::RenderBackend;
use crate::gpu::renderer::Renderer;
use crate::mask::{Mask, MaskList};
use crate::ops::adjustments::{Adjustment, DEFAULT_PIPELINE, EffectState};

pub const RECIPE_MAGIC_V1: &str = "LFE1";

/// Recipes with more masks than this are rejected on load.
const MAX_RECIPE_MASKS: usize = 1024;

/// Decoder byte budget. Generous for `MAX_RECIPE_MASKS` masks, small enough
/// that a forged length prefix cannot drive a large allocation.
const MAX_RECIPE_BYTES: u64 = 1 << 20;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditRecipe {
    magic: String,
    pub modules: Vec<Adjustment>,
    pub effects: EffectState,
    pub masks: Vec<Mask>,
}

impl Default for EditRecipe {
    fn default() -> Self {
        Self::new(DEFAULT_PIPELINE.to_vec(), EffectState::default(), Vec::new())
    }
}

impl EditRecipe {
    pub fn new(modules: Vec<Adjustment>, effects: EffectState, masks: Vec<Mask>) -> Self {
        Self {
            magic: RECIPE_MAGIC_V1.to_string(),
            modules,
            effects,
            masks,
        }
    }

    /// Capture the current edit state of a renderer.
    pub fn from_renderer<B: RenderBackend>(renderer: &Renderer<B>) -> Self {
        Self::new(
            renderer.modules().to_vec(),
            *renderer.effects(),
            renderer.masks().to_vec(),
        )
    }

    /// Mask list that continues id allocation after the saved masks.
    pub fn mask_list(&self) -> MaskList {
        MaskList::from_masks(self.masks.clone())
    }

    /// Push modules, effects and masks into a renderer. A failed program
    /// build leaves the renderer's previous program in place.
    pub fn apply_to<B: RenderBackend>(&self, renderer: &mut Renderer<B>) -> Result<()> {
        if renderer.modules() != self.modules.as_slice() {
            renderer.set_modules(self.modules.clone())?;
        }
        let mut effects = self.effects;
        effects.normalize();
        renderer.set_effects(effects);
        renderer.set_masks(self.mask_list().as_slice());
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Self::from_bytes(&raw)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < 12 {
            return Err(EngineError::Recipe("file too small".into()));
        }
        // bincode writes a String as an 8-byte length prefix + UTF-8 data,
        // so bytes 8..12 hold the magic.
        let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
        if magic != RECIPE_MAGIC_V1 {
            return Err(EngineError::Recipe(format!("unknown magic '{magic}'")));
        }
        if raw.len() as u64 > MAX_RECIPE_BYTES {
            return Err(EngineError::Recipe(format!(
                "{} bytes exceeds the limit of {MAX_RECIPE_BYTES}",
                raw.len()
            )));
        }
        // Same wire format as `bincode::serialize`, but bounded.
        let mut recipe: EditRecipe = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(MAX_RECIPE_BYTES)
            .deserialize(raw)?;
        if recipe.masks.len() > MAX_RECIPE_MASKS {
            return Err(EngineError::Recipe(format!(
                "{} masks exceeds the limit of {MAX_RECIPE_MASKS}",
                recipe.masks.len()
            )));
        }
        recipe.effects.normalize();
        recipe.masks.iter_mut().for_each(Mask::normalize);
        Ok(recipe)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::software::SoftwareBackend;
    use crate::mask::{MIN_RADIUS, MaskKind};
    use crate::transform::Point;

    fn sample() -> EditRecipe {
        let mut effects = EffectState::default();
        effects.set(Adjustment::Shadows, 35.0);
        let mut list = MaskList::new();
        list.add(MaskKind::Ellipse, Point::new(40.0, 30.0))
            .effects
            .set(Adjustment::Exposure, -0.5);
        list.add(MaskKind::Circle, Point::new(10.0, 10.0));
        EditRecipe::new(
            vec![Adjustment::Exposure, Adjustment::Shadows],
            effects,
            list.as_slice().to_vec(),
        )
    }

    #[test]
    fn bytes_carry_magic_and_restore() {
        let r = sample();
        let bytes = r.to_bytes().unwrap();
        assert_eq!(&bytes[8..12], RECIPE_MAGIC_V1.as_bytes());
        assert_eq!(EditRecipe::from_bytes(&bytes).unwrap(), r);
        assert_eq!(r.mask_list().next_id(), 3);
    }

    #[test]
    fn foreign_files_are_rejected() {
        assert!(matches!(EditRecipe::from_bytes(b"tiny"), Err(EngineError::Recipe(_))));
        let mut bytes = sample().to_bytes().unwrap();
        bytes[8] = b'X';
        assert!(matches!(EditRecipe::from_bytes(&bytes), Err(EngineError::Recipe(_))));
    }

    #[test]
    fn apply_pushes_state_into_renderer() {
        let mut renderer = Renderer::new(SoftwareBackend::new(), DEFAULT_PIPELINE.to_vec()).unwrap();
        let r = sample();
        r.apply_to(&mut renderer).unwrap();
        assert_eq!(renderer.modules(), r.modules.as_slice());
        assert_eq!(renderer.effects().get(Adjustment::Shadows), 35.0);
        assert_eq!(renderer.masks().len(), 2);
        assert_eq!(EditRecipe::from_renderer(&renderer), r);
    }

    #[test]
    fn degenerate_masks_are_clamped_on_load() {
        let mut mask = Mask::new(7, MaskKind::Ellipse, Point::new(20.0, 20.0));
        mask.rx = 0.0;
        mask.ry = -3.0;
        mask.feather = -7.0;
        mask.rotation = f32::NAN;
        let r = EditRecipe::new(DEFAULT_PIPELINE.to_vec(), EffectState::default(), vec![mask]);
        let loaded = EditRecipe::from_bytes(&r.to_bytes().unwrap()).unwrap();
        let m = &loaded.masks[0];
        assert_eq!((m.rx, m.ry), (MIN_RADIUS, MIN_RADIUS));
        assert_eq!(m.feather, 0.0);
        assert_eq!(m.rotation, 0.0);

        // a recipe built in memory is clamped on the way into the renderer too
        let mut renderer = Renderer::new(SoftwareBackend::new(), DEFAULT_PIPELINE.to_vec()).unwrap();
        r.apply_to(&mut renderer).unwrap();
        let m = &renderer.masks()[0];
        assert!(m.rx >= MIN_RADIUS && m.ry >= MIN_RADIUS && m.feather >= 0.0);
        assert_eq!(r.mask_list().as_slice()[0].rx, MIN_RADIUS);
    }

    #[test]
    fn forged_length_prefix_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        // modules vector length sits right after the 12-byte magic string
        bytes[12..20].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(EditRecipe::from_bytes(&bytes).is_err());
        let oversized = vec![0u8; MAX_RECIPE_BYTES as usize + 1];
        assert!(matches!(EditRecipe::from_bytes(&oversized), Err(EngineError::Recipe(_))));
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("lumafe_recipe_{}.lfe", std::process::id()));
        let r = sample();
        r.save(&path).unwrap();
        assert_eq!(EditRecipe::load(&path).unwrap(), r);
        let _ = std::fs::remove_file(&path);
    }
}
