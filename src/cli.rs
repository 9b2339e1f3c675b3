// ============================================================================
// LumaFE CLI: headless batch grading and export via command-line arguments
// ============================================================================
//
// Usage examples:
//   lumafe -i photo.jpg -o out.png --effect exposure=0.7 --effect contrast=15
//   lumafe -i *.jpg --output-dir graded/ --recipe look.lfe
//   lumafe -i face.png -o out.png --mask "320,240,120,160;shadows=40;feather=50"
//   lumafe -i a.png b.png --output-dir out/ --modules exposure,contrast --cpu
//
// Every input is decoded, bound to the renderer, exported at 1:1 and written
// as PNG. The same backend and edit state are reused across all inputs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::app::EditorApp;
use crate::gpu::{RenderBackend, SoftwareBackend, open_backend};
use crate::mask::{MaskKind, MaskList};
use crate::ops::adjustments::parse_pipeline;
use crate::project::EditRecipe;
use crate::settings::{BackendChoice, EngineSettings};
use crate::transform::Point;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// LumaFE headless grader.
#[derive(Parser, Debug)]
#[command(
    name = "lumafe",
    about = "LumaFE headless photo grading and export",
    long_about = "Apply global and masked tone adjustments to image files and export\n\
                  them as full-resolution PNG.\n\n\
                  Example:\n  \
                  lumafe --input photo.jpg --effect exposure=0.5 --output out.png\n  \
                  lumafe -i *.jpg --recipe look.lfe --output-dir graded/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing; files keep their stem.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Global effect, e.g. `exposure=0.5`. Repeatable.
    #[arg(short, long, value_name = "NAME=VALUE")]
    pub effect: Vec<String>,

    /// Elliptical mask "cx,cy,rx,ry[;key=value...]" in image pixels (origin
    /// bottom-left). Keys: kind, rotation (degrees), feather, or any effect.
    #[arg(short, long, value_name = "SPEC")]
    pub mask: Vec<String>,

    /// Comma-separated module order, e.g. "exposure,contrast,shadows".
    #[arg(long, value_name = "LIST")]
    pub modules: Option<String>,

    /// Start from a saved edit recipe (.lfe). --effect and --mask apply on top.
    #[arg(long, value_name = "FILE.lfe")]
    pub recipe: Option<PathBuf>,

    /// Write the final edit state to a recipe file.
    #[arg(long, value_name = "FILE.lfe")]
    pub save_recipe: Option<PathBuf>,

    /// Render on the CPU even when a GPU is available.
    #[arg(long)]
    pub cpu: bool,

    /// Per-file timing and debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = setup failed or one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let mut settings = EngineSettings::load();
    if args.cpu {
        settings.backend = BackendChoice::Cpu;
    }
    if let Some(list) = &args.modules {
        settings.modules = parse_pipeline(list);
    }

    let mut app = match open_app(&settings) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if args.verbose {
        println!("backend: {}", app.renderer().backend().name());
    }

    if let Err(e) = configure(&mut app, &args) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(path) = &args.save_recipe {
        if let Err(e) = app.recipe().save(path) {
            eprintln!("error: could not write recipe '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        match run_one(&mut app, input_path, &output_path) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("CLI: '{}' failed: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn open_app(settings: &EngineSettings) -> crate::error::Result<EditorApp<Box<dyn RenderBackend>>> {
    let backend: Box<dyn RenderBackend> = match settings.backend {
        BackendChoice::Cpu => Box::new(SoftwareBackend::new()),
        BackendChoice::Gpu => open_backend(&settings.preferred_gpu, false)?,
        BackendChoice::Auto => open_backend(&settings.preferred_gpu, true)?,
    };
    EditorApp::new(backend, settings)
}

/// Apply recipe, effects and masks from the command line.
fn configure<B: RenderBackend>(app: &mut EditorApp<B>, args: &CliArgs) -> Result<(), String> {
    let mut masks = MaskList::new();
    if let Some(path) = &args.recipe {
        let recipe = EditRecipe::load(path)
            .map_err(|e| format!("could not read recipe '{}': {}", path.display(), e))?;
        app.apply_recipe(&recipe).map_err(|e| e.to_string())?;
        masks = recipe.mask_list();
    }

    for spec in &args.effect {
        let (name, value) = parse_effect(spec)?;
        if !app.set_effect(name, value).map_err(|e| e.to_string())? {
            eprintln!("warning: unknown effect '{}' ignored.", name);
        }
    }

    if !args.mask.is_empty() {
        for spec in &args.mask {
            add_mask_from_spec(&mut masks, spec)?;
        }
        app.set_mask_list(masks).map_err(|e| e.to_string())?;
    }
    Ok(())
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one<B: RenderBackend>(app: &mut EditorApp<B>, input: &Path, output: &Path) -> Result<(), String> {
    app.open(input).map_err(|e| format!("load failed: {}", e))?;
    let graded = app
        .export_image()
        .map_err(|e| format!("export failed: {}", e))?;
    crate::io::write_png(&graded, output).map_err(|e| format!("save failed: {}", e))?;
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_effect(spec: &str) -> Result<(&str, f32), String> {
    let (name, value) = spec
        .split_once('=')
        .ok_or_else(|| format!("effect '{}' is not NAME=VALUE", spec))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("effect '{}' has a non-numeric value", spec))?;
    Ok((name.trim(), value))
}

/// Parse "cx,cy,rx,ry[;key=value...]" and append the mask.
fn add_mask_from_spec(masks: &mut MaskList, spec: &str) -> Result<(), String> {
    let mut parts = spec.split(';');
    let geometry: Vec<f32> = parts
        .next()
        .unwrap_or("")
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("mask '{}': geometry must be four numbers", spec))?;
    let &[cx, cy, rx, ry] = geometry.as_slice() else {
        return Err(format!("mask '{}': expected cx,cy,rx,ry", spec));
    };

    let mask = masks.add(MaskKind::Ellipse, Point::new(cx, cy));
    mask.set_radii(rx, ry);
    mask.outline = false;

    for pair in parts.filter(|p| !p.trim().is_empty()) {
        let (key, val) = pair
            .split_once('=')
            .ok_or_else(|| format!("mask '{}': '{}' is not key=value", spec, pair))?;
        let key = key.trim();
        let val = val.trim();
        if key == "kind" {
            mask.kind = MaskKind::from_name(val)
                .ok_or_else(|| format!("mask '{}': unknown kind '{}'", spec, val))?;
            continue;
        }
        let num = val
            .parse::<f32>()
            .map_err(|_| format!("mask '{}': '{}' is not a number", spec, val))?;
        match key {
            "rotation" => mask.rotation = num.to_radians(),
            "feather" => mask.set_feather(num),
            _ => {
                if !mask.effects.set_named(key, num) {
                    eprintln!("warning: unknown mask key '{}' ignored.", key);
                }
            }
        }
    }
    Ok(())
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_graded.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_graded.png", stem)))
}
