// ============================================================================
// ADJUSTMENTS: tone-mapping modules, effect state, and CPU reference math
// ============================================================================
//
// Every module here has a WGSL twin in `gpu/shaders.rs`. The functions in
// this file are the reference the software backend renders with, so the two
// must stay numerically in step (same constants, same clamping points).
//
// Colour convention: inputs and outputs are sRGB-encoded floats in [0, 1].
// Exposure and contrast work in linear light internally; the tone modules
// (highlights / shadows / whites / blacks) and brightness work on the
// encoded values.
// ============================================================================

use serde::{Deserialize, Serialize};

/// Number of float slots in one effect block (7 used, 1 padding).
pub const EFFECT_SLOTS: usize = 8;

// ============================================================================
// MODULE REGISTRY
// ============================================================================

/// One tone-mapping step of the composite program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Adjustment {
    Exposure,
    Contrast,
    Highlights,
    Shadows,
    Whites,
    Blacks,
    Brightness,
}

/// Default pipeline order used when nothing else is configured.
pub const DEFAULT_PIPELINE: [Adjustment; 7] = Adjustment::ALL;

impl Adjustment {
    pub const ALL: [Adjustment; 7] = [
        Adjustment::Exposure,
        Adjustment::Contrast,
        Adjustment::Highlights,
        Adjustment::Shadows,
        Adjustment::Whites,
        Adjustment::Blacks,
        Adjustment::Brightness,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Adjustment::Exposure => "exposure",
            Adjustment::Contrast => "contrast",
            Adjustment::Highlights => "highlights",
            Adjustment::Shadows => "shadows",
            Adjustment::Whites => "whites",
            Adjustment::Blacks => "blacks",
            Adjustment::Brightness => "brightness",
        }
    }

    /// Case-insensitive lookup. `None` for names with no module.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    /// Index of this module's amount inside an effect block.
    pub fn slot(self) -> usize {
        self as usize
    }

    /// Accepted value range. Exposure is in stops, everything else in
    /// percent.
    pub fn range(self) -> (f32, f32) {
        match self {
            Adjustment::Exposure => (-5.0, 5.0),
            _ => (-100.0, 100.0),
        }
    }

    /// CPU reference for one module.
    pub fn apply(self, c: [f32; 3], amount: f32) -> [f32; 3] {
        match self {
            Adjustment::Exposure => exposure(c, amount),
            Adjustment::Contrast => contrast(c, amount),
            Adjustment::Highlights => tone_scale(c, highlight_weight(luminance(c)), amount, 0.5, 0.7),
            Adjustment::Shadows => tone_scale(c, shadow_weight(luminance(c)), amount, 0.6, 0.3),
            Adjustment::Whites => tone_scale(c, white_weight(luminance(c)), amount, 0.6, 0.4),
            Adjustment::Blacks => tone_scale(c, black_weight(luminance(c)), amount, 0.5, 0.6),
            Adjustment::Brightness => brightness(c, amount),
        }
    }
}

/// Parse a comma/space separated module list. Unknown names are logged and
/// skipped; the rest keep their order (duplicates included).
pub fn parse_pipeline(list: &str) -> Vec<Adjustment> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .filter_map(|name| {
            let adj = Adjustment::from_name(name);
            if adj.is_none() {
                crate::log_warn!("Unknown adjustment module '{}' skipped", name);
            }
            adj
        })
        .collect()
}

// ============================================================================
// EFFECT STATE
// ============================================================================

/// Scalar amount per module. All zeros is the identity for every module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectState {
    values: [f32; EFFECT_SLOTS],
}

impl EffectState {
    pub fn get(&self, adj: Adjustment) -> f32 {
        self.values[adj.slot()]
    }

    /// Set an amount, clamped to the module's range. NaN is treated as 0.
    pub fn set(&mut self, adj: Adjustment, value: f32) {
        let (lo, hi) = adj.range();
        let v = if value.is_nan() { 0.0 } else { value.clamp(lo, hi) };
        self.values[adj.slot()] = v;
    }

    /// String-keyed setter used by slider panels and the CLI. Returns `false`
    /// (after logging a warning) when the name has no module.
    pub fn set_named(&mut self, name: &str, value: f32) -> bool {
        match Adjustment::from_name(name) {
            Some(adj) => {
                self.set(adj, value);
                true
            }
            None => {
                crate::log_warn!("set_effect: unknown effect '{}' ignored", name);
                false
            }
        }
    }

    /// Re-clamp every slot, for amounts that bypassed `set` (decoded files).
    pub fn normalize(&mut self) {
        for adj in Adjustment::ALL {
            self.set(adj, self.get(adj));
        }
    }

    pub fn is_identity(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Raw slot array in uniform layout.
    pub fn as_uniform(&self) -> [f32; EFFECT_SLOTS] {
        self.values
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Rec. 709 luma weights.
pub fn luminance(c: [f32; 3]) -> f32 {
    0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2]
}

fn map3(c: [f32; 3], f: impl Fn(f32) -> f32) -> [f32; 3] {
    [f(c[0]), f(c[1]), f(c[2])]
}

fn clamp01(c: [f32; 3]) -> [f32; 3] {
    map3(c, |v| v.clamp(0.0, 1.0))
}

// ============================================================================
// MODULES
// ============================================================================

const KNEE_START: f32 = 0.85;
const KNEE_END: f32 = 1.25;

/// Linear-light gain of `2^stops` with an exponential highlight roll-off
/// blended in over [KNEE_START, KNEE_END]. The knee fades in with the first
/// stop of positive exposure, so 0 stops leaves every value untouched.
pub fn exposure(c: [f32; 3], stops: f32) -> [f32; 3] {
    let gain = 2.0f32.powf(stops);
    let knee = stops.clamp(0.0, 1.0);
    map3(c, |v| {
        let lin = srgb_to_linear(v) * gain;
        let t = ((lin - KNEE_START) / (KNEE_END - KNEE_START)).clamp(0.0, 1.0);
        let rolled = KNEE_START + (1.0 - (-(lin - KNEE_START)).exp());
        linear_to_srgb(mix(lin, rolled, t * knee).clamp(0.0, 1.0))
    })
}

/// S-curve on linear luminance pivoting at 0.5, applied by scaling the
/// linear colour with new/old luminance so hue and chroma survive.
pub fn contrast(c: [f32; 3], amount: f32) -> [f32; 3] {
    let lin = map3(c, srgb_to_linear);
    let y = luminance(lin);
    if y <= 1e-5 {
        return c;
    }
    // below -1 the curve folds over and inverts tones around the pivot
    let k = (amount / 100.0 * 1.25).max(-1.0);
    let x = y - 0.5;
    let s = x * (1.0 + k * (1.0 - x.abs() * 2.0));
    let new_y = (s + 0.5).clamp(0.0, 1.0);
    let ratio = new_y / y;
    map3(lin, |v| linear_to_srgb((v * ratio).clamp(0.0, 1.0)))
}

pub fn highlight_weight(y: f32) -> f32 {
    smoothstep(0.5, 0.85, y)
}

pub fn shadow_weight(y: f32) -> f32 {
    1.0 - smoothstep(0.1, 0.4, y)
}

pub fn white_weight(y: f32) -> f32 {
    smoothstep(0.7, 1.0, y)
}

pub fn black_weight(y: f32) -> f32 {
    1.0 - smoothstep(0.0, 0.15, y)
}

/// Scale the luminance-masked share of `c`. Positive amounts use
/// `boost_slope`, negative ones `recover_slope`.
pub fn tone_scale(c: [f32; 3], weight: f32, amount: f32, boost_slope: f32, recover_slope: f32) -> [f32; 3] {
    let a = amount / 100.0;
    let slope = if a >= 0.0 { boost_slope } else { recover_slope };
    let factor = 1.0 + a * slope * weight;
    clamp01(map3(c, |v| v * factor))
}

/// Multiplicative post-scale by `(amount + 100) / 100`.
pub fn brightness(c: [f32; 3], amount: f32) -> [f32; 3] {
    let f = (amount + 100.0) / 100.0;
    clamp01(map3(c, |v| v * f))
}

/// Thread `c` through `modules` in order, reading amounts from `fx`.
pub fn grade(c: [f32; 3], modules: &[Adjustment], fx: &EffectState) -> [f32; 3] {
    modules
        .iter()
        .fold(c, |acc, adj| adj.apply(acc, fx.get(*adj)))
}
