//! Data value to RGBA8 mapping

use serde::{Deserialize, Serialize};

use crate::core::types::{Rgba, TRANSPARENT};

/// Exponent used by log scaling: `log(a * t + 1) / log(a)`
const LOG_EXPONENT: f32 = 1000.0;

/// Stretch applied to normalized values before color mapping
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingType {
    #[default]
    Linear,
    Log,
    Sqrt,
    Square,
}

impl ScalingType {
    /// Stretch `t` in `[0, 1]`; output is also in `[0, 1]`
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            ScalingType::Linear => t,
            ScalingType::Log => (LOG_EXPONENT * t + 1.0).ln() / LOG_EXPONENT.ln(),
            ScalingType::Sqrt => t.sqrt(),
            ScalingType::Square => t * t,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMap {
    #[default]
    Greyscale,
    /// Black, red, yellow, white
    Heat,
}

impl ColorMap {
    /// Opaque color for `t` in `[0, 1]`
    pub fn sample(self, t: f32) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        match self {
            ColorMap::Greyscale => {
                let g = to_u8(t);
                [g, g, g, 255]
            }
            ColorMap::Heat => [to_u8(t * 3.0), to_u8(t * 3.0 - 1.0), to_u8(t * 3.0 - 2.0), 255],
        }
    }
}

/// Normalize `value` into `[0, 1]` over `range`. `None` for non-finite values.
///
/// A degenerate range maps everything finite to 0.
pub fn normalize(value: f32, range: (f32, f32)) -> Option<f32> {
    if !value.is_finite() {
        return None;
    }
    let (min, max) = range;
    let span = max - min;
    if !(span > 0.0) {
        return Some(0.0);
    }
    Some(((value - min) / span).clamp(0.0, 1.0))
}

/// Full value-to-color pipeline. Non-finite values render transparent.
pub fn map_value(value: f32, range: (f32, f32), scaling: ScalingType, color_map: ColorMap) -> Rgba {
    match normalize(value, range) {
        Some(t) => color_map.sample(scaling.apply(t)),
        None => TRANSPARENT,
    }
}

/// Alpha-blend `top` over `bottom`
pub fn blend(bottom: Rgba, top: Rgba) -> Rgba {
    let a = top[3] as u32;
    if a == 255 {
        return top;
    }
    if a == 0 {
        return bottom;
    }
    let mix = |b: u8, t: u8| ((t as u32 * a + b as u32 * (255 - a) + 127) / 255) as u8;
    let out_alpha = a + bottom[3] as u32 * (255 - a) / 255;
    [
        mix(bottom[0], top[0]),
        mix(bottom[1], top[1]),
        mix(bottom[2], top[2]),
        out_alpha.min(255) as u8,
    ]
}

/// Replace a color's alpha with `opacity` in `[0, 1]`
pub fn with_opacity(color: Rgba, opacity: f32) -> Rgba {
    [color[0], color[1], color[2], to_u8(opacity)]
}

fn to_u8(t: f32) -> u8 {
    (t.clamp(0.0, 1.0) * 255.0).round() as u8
}
