// ============================================================================
// LumaFE: GPU photo grading engine with elliptical masks
// ============================================================================
//
//   transform.rs  camera, projections, screen/world/texture mappings
//   mask.rs       mask model, handles, hit testing, analytic weight fields
//   ops/          tone adjustment math (CPU reference of the WGSL)
//   gpu/          shader composer, render backends, renderer
//   canvas.rs     gesture controller (camera + mask edits)
//   app.rs        EditorApp: controller → renderer glue
//   project.rs    .lfe edit recipes
//   settings.rs   persisted engine settings
//   cli.rs        headless batch export
// ============================================================================

#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod error;
pub mod gpu;
pub mod io;
pub mod mask;
pub mod ops;
pub mod project;
pub mod settings;
pub mod transform;

pub use app::EditorApp;
pub use error::{EngineError, Result};
