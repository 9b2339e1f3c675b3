//! Composite programs across module lists, checked by naga and by pixels.

use image::{Rgba, RgbaImage};

use lumafe::EditorApp;
use lumafe::error::EngineError;
use lumafe::gpu::backend::RenderBackend;
use lumafe::gpu::composer::{ProgramSource, compose, compose_named, validate_wgsl};
use lumafe::gpu::SoftwareBackend;
use lumafe::ops::adjustments::Adjustment;
use lumafe::settings::EngineSettings;

#[test]
fn every_module_subset_validates() {
    let all = Adjustment::ALL;
    for bits in 0u32..(1 << all.len()) {
        let modules: Vec<Adjustment> = all
            .iter()
            .enumerate()
            .filter(|(i, _)| bits & (1 << i) != 0)
            .map(|(_, a)| *a)
            .collect();
        let p = compose(&modules);
        validate_wgsl(&p.label, &p.wgsl).unwrap_or_else(|e| panic!("{}: {e}", p.label));
    }
}

#[test]
fn reversed_and_repeated_lists_validate() {
    let mut modules = Adjustment::ALL.to_vec();
    modules.reverse();
    modules.extend_from_slice(&Adjustment::ALL);
    let p = compose(&modules);
    validate_wgsl(&p.label, &p.wgsl).unwrap();
    assert_eq!(p.modules.len(), 14);
}

#[test]
fn named_lists_skip_unknown_entries() {
    let p = compose_named(&["Shadows", "grain", " whites "]);
    assert_eq!(p.modules, vec![Adjustment::Shadows, Adjustment::Whites]);
}

#[test]
fn zero_exposure_matches_no_exposure_module() {
    let img = RgbaImage::from_fn(32, 32, |x, y| Rgba([(x * 8) as u8, (y * 8) as u8, 250, 255]));
    let settings = EngineSettings {
        viewport_width: 64,
        viewport_height: 64,
        ..EngineSettings::default()
    };
    let export = |modules: Vec<Adjustment>| {
        let mut a = EditorApp::new(SoftwareBackend::new(), &settings).unwrap();
        a.set_modules(modules).unwrap();
        a.load_image(&img).unwrap();
        a.set_effect("exposure", 0.0).unwrap();
        a.export_image().unwrap()
    };
    let with = export(vec![Adjustment::Exposure]);
    let without = export(Vec::new());
    let diff = with
        .as_raw()
        .iter()
        .zip(without.as_raw())
        .map(|(a, b)| a.abs_diff(*b))
        .max()
        .unwrap_or(0);
    assert!(diff <= 1);
}

#[test]
fn backend_rejects_program_without_entry_points() {
    let mut be = SoftwareBackend::new();
    let broken = ProgramSource {
        label: "bare".into(),
        wgsl: "fn helper() -> f32 { return 1.0; }".into(),
        modules: Vec::new(),
    };
    assert!(matches!(
        be.build_program(&broken),
        Err(EngineError::ProgramLinkFailed { .. })
    ));

    let garbage = ProgramSource {
        label: "garbage".into(),
        wgsl: "this is not wgsl".into(),
        modules: Vec::new(),
    };
    let err = be.build_program(&garbage).unwrap_err();
    assert!(err.is_build_failure());
    assert_eq!(be.program_count(), 0);
}
