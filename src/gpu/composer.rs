// ============================================================================
// SHADER COMPOSER: builds the composite WGSL from an ordered module list
// ============================================================================
//
// Output shape:
//
//   COMPOSITE_PREAMBLE
//   <definition of each distinct module, first-use order>
//   fn grade(c_in, fx) { c = apply_<m0>(c, fx.<slot>); ... }   // every entry
//   COMPOSITE_MAIN
//
// Definitions are emitted once per module; invocations are emitted once per
// list entry, so ["exposure", "exposure"] applies exposure twice. Amounts
// are always read from uniforms, never baked into the text, so a slider drag
// never forces a rebuild.
// ============================================================================

use std::fmt::Write as _;

use crate::error::{EngineError, Result};
use crate::ops::adjustments::Adjustment;

use super::shaders::{COMPOSITE_MAIN, COMPOSITE_PREAMBLE, effect_field, module_source};

/// A composed, not-yet-compiled program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramSource {
    pub label: String,
    pub wgsl: String,
    /// The module chain the program was composed from, in order.
    pub modules: Vec<Adjustment>,
}

pub fn compose(modules: &[Adjustment]) -> ProgramSource {
    let mut wgsl = String::with_capacity(8 * 1024);
    wgsl.push_str(COMPOSITE_PREAMBLE);

    let mut emitted: Vec<Adjustment> = Vec::with_capacity(modules.len());
    for adj in modules {
        if !emitted.contains(adj) {
            wgsl.push_str(module_source(*adj).definition);
            emitted.push(*adj);
        }
    }

    wgsl.push_str("\nfn grade(c_in: vec3<f32>, fx: Effects) -> vec3<f32> {\n    var c = c_in;\n");
    for adj in modules {
        let _ = writeln!(
            wgsl,
            "    c = {}(c, fx.{});",
            module_source(*adj).function,
            effect_field(*adj)
        );
    }
    wgsl.push_str("    return c;\n}\n");
    wgsl.push_str(COMPOSITE_MAIN);

    ProgramSource {
        label: program_label(modules),
        wgsl,
        modules: modules.to_vec(),
    }
}

/// String-keyed entry point. Unknown names are skipped with a warning and
/// composition continues with the rest.
pub fn compose_named<S: AsRef<str>>(names: &[S]) -> ProgramSource {
    compose(&resolve_names(names))
}

pub fn resolve_names<S: AsRef<str>>(names: &[S]) -> Vec<Adjustment> {
    names
        .iter()
        .filter_map(|n| {
            let adj = Adjustment::from_name(n.as_ref());
            if adj.is_none() {
                crate::log_warn!("Shader composer: unknown module '{}' skipped", n.as_ref());
            }
            adj
        })
        .collect()
}

fn program_label(modules: &[Adjustment]) -> String {
    if modules.is_empty() {
        return "composite[identity]".to_string();
    }
    let names: Vec<&str> = modules.iter().map(|a| a.name()).collect();
    format!("composite[{}]", names.join(","))
}

/// Parse and validate WGSL with naga. Errors carry the formatted compiler
/// log.
pub fn validate_wgsl(label: &str, source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| EngineError::ShaderCompileFailed {
        label: label.to_string(),
        log: e.emit_to_string(source),
    })?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| EngineError::ShaderCompileFailed {
        label: label.to_string(),
        log: format!("{e:?}"),
    })?;
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::adjustments::DEFAULT_PIPELINE;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn empty_list_is_identity_and_valid() {
        let p = compose(&[]);
        assert_eq!(p.label, "composite[identity]");
        assert!(p.wgsl.contains("var c = c_in;\n    return c;"));
        validate_wgsl(&p.label, &p.wgsl).unwrap();
    }

    #[test]
    fn full_pipeline_validates() {
        let p = compose(&DEFAULT_PIPELINE);
        validate_wgsl(&p.label, &p.wgsl).unwrap();
    }

    #[test]
    fn duplicate_module_defined_once_invoked_twice() {
        let p = compose(&[Adjustment::Exposure, Adjustment::Exposure]);
        assert_eq!(count(&p.wgsl, "fn apply_exposure("), 1);
        assert_eq!(count(&p.wgsl, "c = apply_exposure(c, fx.a.x);"), 2);
        validate_wgsl(&p.label, &p.wgsl).unwrap();
    }

    #[test]
    fn invocation_order_follows_list() {
        let a = compose(&[Adjustment::Exposure, Adjustment::Contrast]);
        let b = compose(&[Adjustment::Contrast, Adjustment::Exposure]);
        assert_ne!(a.wgsl, b.wgsl);
        let ia = a.wgsl.find("c = apply_exposure").unwrap();
        let ic = a.wgsl.find("c = apply_contrast").unwrap();
        assert!(ia < ic);
        let ia = b.wgsl.find("c = apply_exposure").unwrap();
        let ic = b.wgsl.find("c = apply_contrast").unwrap();
        assert!(ic < ia);
    }

    #[test]
    fn unknown_names_are_skipped() {
        let p = compose_named(&["exposure", "vibrance", "brightness"]);
        assert_eq!(p.modules, vec![Adjustment::Exposure, Adjustment::Brightness]);
        assert!(!p.wgsl.contains("vibrance"));
        validate_wgsl(&p.label, &p.wgsl).unwrap();
    }

    #[test]
    fn amounts_are_never_baked_in() {
        // The text depends only on the module list.
        let p1 = compose(&DEFAULT_PIPELINE);
        let p2 = compose(&DEFAULT_PIPELINE);
        assert_eq!(p1, p2);
    }

    #[test]
    fn broken_source_reports_compile_log() {
        let err = validate_wgsl("broken", "fn main( {").unwrap_err();
        match err {
            EngineError::ShaderCompileFailed { label, log } => {
                assert_eq!(label, "broken");
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
