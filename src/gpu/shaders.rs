// ============================================================================
// GPU SHADERS: all WGSL kept inline, one constant per stage group
// ============================================================================
//
// The composite program is not a single constant: `composer.rs` stitches
// COMPOSITE_PREAMBLE + the requested module definitions + a generated
// `grade()` + COMPOSITE_MAIN. Everything else here is a complete shader.
//
// Numeric twins of every function below live in `ops/adjustments.rs` and
// `mask.rs`; the software backend renders with those.
// ============================================================================

use crate::ops::adjustments::Adjustment;

// ============================================================================
// COMPOSITE PREAMBLE: uniforms, bindings, vertex stage, shared helpers
// ============================================================================
//
// Frame layout (std140-compatible, 368 bytes):
//   proj        mat4x4   0
//   image_size  vec2     64
//   mask_count  u32      72
//   _pad        u32      76
//   global_fx   Effects  80   (2 x vec4: exposure contrast highlights shadows |
//                                         whites blacks brightness _)
//   local_fx    Effects[8] 112
pub const COMPOSITE_PREAMBLE: &str = r#"
const MAX_MASKS: u32 = 8u;

struct Effects {
    a: vec4<f32>,
    b: vec4<f32>,
};

struct Frame {
    proj: mat4x4<f32>,
    image_size: vec2<f32>,
    mask_count: u32,
    _pad: u32,
    global_fx: Effects,
    local_fx: array<Effects, 8>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(1) @binding(0) var src_tex: texture_2d<f32>;
@group(1) @binding(1) var src_samp: sampler;
@group(1) @binding(2) var weight_tex: texture_2d_array<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

// Image quad in world units; uv is flipped on the CPU side so row 0 of the
// texture lands at world y = image height.
@vertex
fn vs_image(@location(0) pos: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = frame.proj * vec4<f32>(pos, 0.0, 1.0);
    out.uv = uv;
    return out;
}

fn srgb_to_linear1(c: f32) -> f32 {
    if (c <= 0.04045) {
        return c / 12.92;
    }
    return pow((c + 0.055) / 1.055, 2.4);
}

fn linear_to_srgb1(c: f32) -> f32 {
    if (c <= 0.0031308) {
        return c * 12.92;
    }
    return 1.055 * pow(c, 1.0 / 2.4) - 0.055;
}

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    return vec3<f32>(srgb_to_linear1(c.x), srgb_to_linear1(c.y), srgb_to_linear1(c.z));
}

fn linear_to_srgb(c: vec3<f32>) -> vec3<f32> {
    return vec3<f32>(linear_to_srgb1(c.x), linear_to_srgb1(c.y), linear_to_srgb1(c.z));
}

fn luminance(c: vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.2126, 0.7152, 0.0722));
}

fn tone_scale(c: vec3<f32>, w: f32, amount: f32, boost: f32, recover: f32) -> vec3<f32> {
    let a = amount / 100.0;
    let slope = select(recover, boost, a >= 0.0);
    return clamp(c * (1.0 + a * slope * w), vec3<f32>(0.0), vec3<f32>(1.0));
}

// Weight of mask `i`: four masks per array layer, one per channel.
fn mask_weight_at(uv: vec2<f32>, i: u32) -> f32 {
    let w = textureSampleLevel(weight_tex, src_samp, uv, i32(i / 4u), 0.0);
    return w[i % 4u];
}
"#;

// ============================================================================
// MODULE DEFINITIONS
// ============================================================================

const EXPOSURE_DEF: &str = r#"
const KNEE_START: f32 = 0.85;
const KNEE_END: f32 = 1.25;

fn exposure_knee(v: f32, strength: f32) -> f32 {
    let t = clamp((v - KNEE_START) / (KNEE_END - KNEE_START), 0.0, 1.0);
    let rolled = KNEE_START + (1.0 - exp(-(v - KNEE_START)));
    return clamp(mix(v, rolled, t * strength), 0.0, 1.0);
}

fn apply_exposure(c: vec3<f32>, stops: f32) -> vec3<f32> {
    let lin = srgb_to_linear(c) * exp2(stops);
    let k = clamp(stops, 0.0, 1.0);
    return linear_to_srgb(vec3<f32>(
        exposure_knee(lin.x, k),
        exposure_knee(lin.y, k),
        exposure_knee(lin.z, k)
    ));
}
"#;

const CONTRAST_DEF: &str = r#"
fn apply_contrast(c: vec3<f32>, amount: f32) -> vec3<f32> {
    let lin = srgb_to_linear(c);
    let y = luminance(lin);
    if (y <= 1e-5) {
        return c;
    }
    let k = max(amount / 100.0 * 1.25, -1.0);
    let x = y - 0.5;
    let s = x * (1.0 + k * (1.0 - abs(x) * 2.0));
    let new_y = clamp(s + 0.5, 0.0, 1.0);
    return linear_to_srgb(clamp(lin * (new_y / y), vec3<f32>(0.0), vec3<f32>(1.0)));
}
"#;

const HIGHLIGHTS_DEF: &str = r#"
fn apply_highlights(c: vec3<f32>, amount: f32) -> vec3<f32> {
    return tone_scale(c, smoothstep(0.5, 0.85, luminance(c)), amount, 0.5, 0.7);
}
"#;

const SHADOWS_DEF: &str = r#"
fn apply_shadows(c: vec3<f32>, amount: f32) -> vec3<f32> {
    return tone_scale(c, 1.0 - smoothstep(0.1, 0.4, luminance(c)), amount, 0.6, 0.3);
}
"#;

const WHITES_DEF: &str = r#"
fn apply_whites(c: vec3<f32>, amount: f32) -> vec3<f32> {
    return tone_scale(c, smoothstep(0.7, 1.0, luminance(c)), amount, 0.6, 0.4);
}
"#;

const BLACKS_DEF: &str = r#"
fn apply_blacks(c: vec3<f32>, amount: f32) -> vec3<f32> {
    return tone_scale(c, 1.0 - smoothstep(0.0, 0.15, luminance(c)), amount, 0.5, 0.6);
}
"#;

const BRIGHTNESS_DEF: &str = r#"
fn apply_brightness(c: vec3<f32>, amount: f32) -> vec3<f32> {
    return clamp(c * ((amount + 100.0) / 100.0), vec3<f32>(0.0), vec3<f32>(1.0));
}
"#;

/// Definition text and entry function of one module.
#[derive(Clone, Copy, Debug)]
pub struct ModuleSource {
    pub definition: &'static str,
    pub function: &'static str,
}

pub fn module_source(adj: Adjustment) -> ModuleSource {
    let (definition, function) = match adj {
        Adjustment::Exposure => (EXPOSURE_DEF, "apply_exposure"),
        Adjustment::Contrast => (CONTRAST_DEF, "apply_contrast"),
        Adjustment::Highlights => (HIGHLIGHTS_DEF, "apply_highlights"),
        Adjustment::Shadows => (SHADOWS_DEF, "apply_shadows"),
        Adjustment::Whites => (WHITES_DEF, "apply_whites"),
        Adjustment::Blacks => (BLACKS_DEF, "apply_blacks"),
        Adjustment::Brightness => (BRIGHTNESS_DEF, "apply_brightness"),
    };
    ModuleSource { definition, function }
}

/// WGSL accessor for an effect slot inside an `Effects` value.
pub fn effect_field(adj: Adjustment) -> &'static str {
    const FIELDS: [&str; 8] = ["a.x", "a.y", "a.z", "a.w", "b.x", "b.y", "b.z", "b.w"];
    FIELDS[adj.slot()]
}

// ============================================================================
// COMPOSITE MAIN: global grade, then per-mask local grades mixed by weight
// ============================================================================
pub const COMPOSITE_MAIN: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let src = textureSample(src_tex, src_samp, in.uv);
    var c = grade(src.rgb, frame.global_fx);
    let count = min(frame.mask_count, MAX_MASKS);
    for (var i = 0u; i < count; i = i + 1u) {
        let w = mask_weight_at(in.uv, i);
        if (w > 0.0) {
            c = mix(c, grade(c, frame.local_fx[i]), w);
        }
    }
    return vec4<f32>(clamp(c, vec3<f32>(0.0), vec3<f32>(1.0)), src.a);
}
"#;

// ============================================================================
// SHARED OVERLAY VERTEX HELPERS
// ============================================================================
//
// Overlays draw a world-space square of half-size `extent` around `center`,
// generated from vertex_index (6 vertices, no vertex buffer).
const QUAD_HELPERS: &str = r#"
struct OverlayVarying {
    @builtin(position) position: vec4<f32>,
    @location(0) world: vec2<f32>,
};

fn quad_corner(vi: u32) -> vec2<f32> {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>(-1.0,  1.0),
        vec2<f32>(-1.0,  1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>( 1.0,  1.0),
    );
    return corners[vi];
}

fn rotate2(p: vec2<f32>, theta: f32) -> vec2<f32> {
    let s = sin(theta);
    let c = cos(theta);
    return vec2<f32>(p.x * c - p.y * s, p.x * s + p.y * c);
}
"#;

// ============================================================================
// MASK WEIGHT SHADER: feathered ellipse into one channel of the weight target
// ============================================================================
//
// The pipeline's colour write mask picks the channel; the fragment writes the
// weight to all four.
const MASK_WEIGHT_BODY: &str = r#"
struct MaskUniforms {
    proj: mat4x4<f32>,
    center: vec2<f32>,
    radii: vec2<f32>,
    rotation: f32,
    feather: f32,
    extent: f32,
    _pad: f32,
};

@group(0) @binding(0) var<uniform> u: MaskUniforms;

@vertex
fn vs_mask(@builtin(vertex_index) vi: u32) -> OverlayVarying {
    var out: OverlayVarying;
    out.world = u.center + quad_corner(vi) * u.extent;
    out.position = u.proj * vec4<f32>(out.world, 0.0, 1.0);
    return out;
}

@fragment
fn fs_mask(in: OverlayVarying) -> @location(0) vec4<f32> {
    let r = rotate2(in.world - u.center, -u.rotation);
    let d = length(r / u.radii);
    let inner = max(1.0 - u.feather / min(u.radii.x, u.radii.y), 0.0);
    var w = 0.0;
    if (inner >= 1.0) {
        w = select(0.0, 1.0, d <= 1.0);
    } else {
        w = 1.0 - smoothstep(inner, 1.0, d);
    }
    return vec4<f32>(w, w, w, w);
}
"#;

// ============================================================================
// OUTLINE SHADER: SDF ring of constant screen thickness
// ============================================================================
const OUTLINE_BODY: &str = r#"
struct OutlineUniforms {
    proj: mat4x4<f32>,
    center: vec2<f32>,
    radii: vec2<f32>,
    rotation: f32,
    half_width: f32,
    feather: f32,
    extent: f32,
    color: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: OutlineUniforms;

@vertex
fn vs_outline(@builtin(vertex_index) vi: u32) -> OverlayVarying {
    var out: OverlayVarying;
    out.world = u.center + quad_corner(vi) * u.extent;
    out.position = u.proj * vec4<f32>(out.world, 0.0, 1.0);
    return out;
}

@fragment
fn fs_outline(in: OverlayVarying) -> @location(0) vec4<f32> {
    let r = rotate2(in.world - u.center, -u.rotation);
    let k = length(r / u.radii) - 1.0;
    let grad = length(r / (u.radii * u.radii));
    let dist = k / max(grad, 1e-6);
    let a = 1.0 - smoothstep(u.half_width - u.feather, u.half_width + u.feather, abs(dist));
    return vec4<f32>(u.color.rgb, u.color.a * a);
}
"#;

// ============================================================================
// HANDLE SHADER: feathered disc, optional blue dot, soft drop shadow
// ============================================================================
const HANDLE_BODY: &str = r#"
struct HandleUniforms {
    proj: mat4x4<f32>,
    center: vec2<f32>,
    radius: f32,
    inner_radius: f32,
    feather: f32,
    shadow: f32,
    shadow_alpha: f32,
    with_inner: f32,
};

@group(0) @binding(0) var<uniform> u: HandleUniforms;

@vertex
fn vs_handle(@builtin(vertex_index) vi: u32) -> OverlayVarying {
    var out: OverlayVarying;
    let extent = u.radius + u.feather + u.shadow;
    out.world = u.center + quad_corner(vi) * extent;
    out.position = u.proj * vec4<f32>(out.world, 0.0, 1.0);
    return out;
}

@fragment
fn fs_handle(in: OverlayVarying) -> @location(0) vec4<f32> {
    let d = length(in.world - u.center);
    let sdf = d - u.radius;
    let disc = 1.0 - smoothstep(0.0, u.feather, sdf);
    let dot_a = u.with_inner * (1.0 - smoothstep(0.0, u.feather, d - u.inner_radius));
    var shade = 0.0;
    if (sdf > 0.0) {
        shade = (1.0 - smoothstep(0.0, u.shadow, sdf)) * u.shadow_alpha;
    }
    let alpha = max(disc, shade);
    if (alpha <= 0.0) {
        discard;
    }
    let body = mix(vec3<f32>(1.0), vec3<f32>(0.2, 0.49, 0.92), dot_a);
    let t = disc / alpha;
    return vec4<f32>(body * t + vec3<f32>(0.2) * (1.0 - t), alpha);
}
"#;

pub fn mask_weight_shader() -> String {
    format!("{QUAD_HELPERS}{MASK_WEIGHT_BODY}")
}

pub fn outline_shader() -> String {
    format!("{QUAD_HELPERS}{OUTLINE_BODY}")
}

pub fn handle_shader() -> String {
    format!("{QUAD_HELPERS}{HANDLE_BODY}")
}
