//! Per-pixel CRT composition.
//!
//! Every stage is a free function so it can be tested (and recombined) on its
//! own. [`Pipeline::shade`] chains them in the fixed order below; each stage
//! consumes the colour produced by the previous one:
//!
//! ```text
//!   frag coord ─▶ curvature remap ─▶ 3x3 blur ─▶ chromatic shift ─▶ mix 60%
//!        ─▶ phosphor glow ─▶ colour correction ─▶ flicker ─▶ [vignette]
//!        ─▶ scanline(x) ─▶ scanline(y) ─▶ enhanced scanlines
//!        ─▶ edge darkening ─▶ corner darkening ─▶ noise ─▶ bounds mask
//! ```

use std::f32::consts::PI;

use glam::{UVec2, Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::params::{ConfigurationError, CrtParams, Stages};
use crate::texture::Sampler;

/// ITU-R BT.601 luma weights.
pub const LUMA_WEIGHTS: Vec3 = Vec3::new(0.299, 0.587, 0.114);

/// Colour written for pixels that fall off the curved glass.
pub const OFF_SCREEN: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

const BLUR_TEXEL_SCALE: f32 = 0.85;
const BLUR_CENTER_WEIGHT: f32 = 0.3;
const BLUR_NEIGHBOR_WEIGHT: f32 = 0.175;
const ABERRATION_MIX: f32 = 0.6;
const PHOSPHOR_TINT: Vec3 = Vec3::new(0.15, 0.9, 0.25);

/// Hermite interpolation between two edges. Reversed edges produce a falling ramp.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Fractional part rounding toward negative infinity, so the result is always in `[0, 1)`.
fn fract(v: Vec2) -> Vec2 {
    v - v.floor()
}

pub fn luminance(color: Vec3) -> f32 {
    color.dot(LUMA_WEIGHTS)
}

/// Barrel distortion of the glass.
///
/// The offset uses the swapped axes, so horizontal curvature bends vertical
/// position and the other way round. The result leaves `[0, 1]` near the
/// corners; [`in_bounds`] turns that into the black bezel.
pub fn curve_remap_uv(uv: Vec2, curvature: Vec2) -> Vec2 {
    let centered = uv * 2.0 - 1.0;
    let offset = Vec2::new(centered.y, centered.x).abs() / curvature;
    let curved = centered + centered * offset * offset;
    curved * 0.5 + 0.5
}

/// 3x3 weighted average around `uv`.
///
/// The weights add up to 1.7, which brightens the picture slightly.
pub fn vintage_blur<S>(source: &S, uv: Vec2, screen_resolution: Vec2) -> Vec3
where
    S: Sampler + ?Sized,
{
    let texel = BLUR_TEXEL_SCALE / screen_resolution;
    let mut color = Vec3::ZERO;
    for dy in [-1.0f32, 0.0, 1.0] {
        for dx in [-1.0f32, 0.0, 1.0] {
            let weight = if dx == 0.0 && dy == 0.0 {
                BLUR_CENTER_WEIGHT
            } else {
                BLUR_NEIGHBOR_WEIGHT
            };
            color += source.sample(uv + Vec2::new(dx, dy) * texel).xyz() * weight;
        }
    }
    color
}

/// Radial strength of the colour fringing. Never zero, even at the centre.
pub fn aberration_strength(uv: Vec2) -> f32 {
    let distance = (uv - 0.5).abs() * 0.5 + 0.75;
    distance.dot(distance) * 0.0015
}

/// Re-reads red and blue from the source at opposite offsets; green comes from `input`.
pub fn chromatic_aberration<S>(input: Vec3, uv: Vec2, source: &S) -> Vec3
where
    S: Sampler + ?Sized,
{
    let strength = aberration_strength(uv);
    let red_offset = Vec2::new(strength * 1.2, strength * 0.8);
    let blue_offset = Vec2::new(-strength * 0.8, -strength * 1.1);

    Vec3::new(
        source.sample(uv + red_offset).x,
        input.y,
        source.sample(uv + blue_offset).z,
    )
}

/// Sub-pixel RGB mask.
///
/// All three bands are driven by the horizontal sub-pixel position only, which
/// yields vertical stripes rather than a dot triad.
pub fn phosphor_mask(uv: Vec2, screen_resolution: Vec2) -> Vec3 {
    let sub_pixel = fract(uv * screen_resolution * 0.75);
    let x = sub_pixel.x;
    Vec3::new(
        smoothstep(0.1, 0.4, x) * smoothstep(0.6, 0.3, x),
        smoothstep(0.25, 0.55, x) * smoothstep(0.85, 0.55, x),
        smoothstep(0.6, 0.9, x),
    )
}

pub fn phosphor_glow(uv: Vec2, color: Vec3, screen_resolution: Vec2) -> Vec3 {
    let mask = phosphor_mask(uv, screen_resolution);
    let glow = color * (0.7 + 0.4 * mask);
    glow + luminance(color) * 0.08 * PHOSPHOR_TINT
}

/// Aged-phosphor grade: green boost, 15% desaturation, warm shift, gamma 0.95.
///
/// Desaturation uses the luminance from before the warm shift.
pub fn vintage_color_correction(color: Vec3) -> Vec3 {
    let color = color * Vec3::new(1.0, 1.05, 1.0);
    let luma = luminance(color);
    let color = Vec3::splat(luma).lerp(color, 0.85);
    let color = color * Vec3::new(1.1, 1.0, 1.4);
    color.powf(0.95)
}

/// Global brightness flicker in `[0.8, 1.0]`.
///
/// `tan` inside `cos` gives sharp jumps near the asymptotes every half period.
pub fn flicker_base(time: f32) -> f32 {
    0.9 + 0.1 * (time * 2.0).tan().cos()
}

/// Rolling horizontal interference band in `[0.8, 1.2]`.
pub fn line_interference(screen_y: f32, time: f32) -> f32 {
    1.0 + 0.2 * (screen_y * 15.0 + time * 50.0).sin()
}

/// Flicker factor for a pixel; `uv` is the flat screen coordinate, not the curved one.
pub fn crt_flicker(uv: Vec2, time: f32) -> f32 {
    flicker_base(time) * line_interference(uv.y, time)
}

/// Classic scanline term, in `[0.1^opacity, 1]`, periodic with period `1 / resolution`.
pub fn scan_line_intensity(u: f32, resolution: f32, opacity: f32) -> f32 {
    let wave = (u * resolution * PI * 2.0).sin();
    let intensity = (0.5 * wave + 0.5) * 0.9 + 0.1;
    intensity.powf(opacity)
}

/// Shimmering scanline modulation, in `[0.66, 1.10]`.
pub fn enhanced_scanlines(uv: Vec2, screen_resolution: Vec2, time: f32) -> f32 {
    let scanline_y = (uv.y * screen_resolution.y * PI).sin();
    let scanline_x = (uv.x * screen_resolution.x * PI * 0.5).sin();
    let intensity = 0.88 + 0.12 * scanline_y * (0.7 + 0.3 * scanline_x);
    intensity + scanline_shimmer(uv.y, screen_resolution.y, time)
}

/// Time-driven part of [`enhanced_scanlines`], in `[-0.1, 0.1]`.
pub fn scanline_shimmer(v: f32, resolution_y: f32, time: f32) -> f32 {
    0.1 * (v * resolution_y * PI * 2.0 + time * 5.0).sin()
}

/// Radial falloff, down to 0.75 far from the centre.
pub fn edge_darkening(uv: Vec2) -> f32 {
    let distance = (uv - 0.5).length();
    1.0 - smoothstep(0.25, 0.8, distance) * 0.25
}

/// Chebyshev falloff, down to 0.85 at the border.
pub fn corner_darkening(uv: Vec2) -> f32 {
    let distance = (uv - 0.5).abs().max_element();
    1.0 - smoothstep(0.3, 0.5, distance) * 0.15
}

/// Additive grain, at most 0.01 in magnitude.
pub fn noise(uv: Vec2, time: f32) -> f32 {
    (uv.x * 1247.1).sin() * (uv.y * 1531.7).sin() * (time * 0.1).sin() * 0.01
}

/// Corner-weighted vignette.
pub fn vignette_intensity(uv: Vec2, screen_resolution: Vec2, opacity: f32) -> f32 {
    let intensity = uv.x * uv.y * (1.0 - uv.x) * (1.0 - uv.y);
    ((screen_resolution.x / 4.0) * intensity)
        .powf(opacity)
        .clamp(0.0, 1.0)
}

/// False only when a coordinate is strictly outside `[0, 1]` on some axis.
///
/// NaN compares false everywhere and is therefore not masked; it surfaces as a
/// corrupt pixel instead.
pub fn in_bounds(uv: Vec2) -> bool {
    !(uv.x < 0.0 || uv.y < 0.0 || uv.x > 1.0 || uv.y > 1.0)
}

/// Validated parameters plus the stage selection, ready to shade pixels.
///
/// `Pipeline` is `Copy` and holds no interior state, so one instance can be
/// shared by every worker evaluating a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pipeline {
    params: CrtParams,
    stages: Stages,
}

impl Pipeline {
    /// Builds a pipeline, rejecting parameters that cannot be evaluated.
    pub fn new(params: CrtParams, stages: Stages) -> Result<Self, ConfigurationError> {
        params.validate()?;
        tracing::debug!(
            curvature = ?params.curvature,
            screen_resolution = ?params.screen_resolution,
            scan_line_opacity = ?params.scan_line_opacity,
            vignette = stages.vignette,
            "constructed CRT pipeline"
        );
        Ok(Self { params, stages })
    }

    pub fn params(&self) -> &CrtParams {
        &self.params
    }

    pub fn stages(&self) -> Stages {
        self.stages
    }

    /// Colour of the output pixel at `pixel` (bottom-left origin) for a frame at `time`.
    pub fn render<S>(&self, pixel: UVec2, output_resolution: UVec2, time: f32, source: &S) -> Vec4
    where
        S: Sampler + ?Sized,
    {
        let frag_coord = pixel.as_vec2() + 0.5;
        self.shade(frag_coord, output_resolution.as_vec2(), time, source)
    }

    /// Evaluates the full composition at a fragment coordinate in pixel units.
    pub fn shade<S>(&self, frag_coord: Vec2, output_resolution: Vec2, time: f32, source: &S) -> Vec4
    where
        S: Sampler + ?Sized,
    {
        let params = &self.params;
        let screen = params.screen_resolution;

        let uv = frag_coord / output_resolution;
        let remapped = curve_remap_uv(uv, params.curvature);

        let blurred = vintage_blur(source, remapped, screen);
        let aberrated = chromatic_aberration(blurred, remapped, source);
        let mut color = blurred.lerp(aberrated, ABERRATION_MIX);

        color = phosphor_glow(remapped, color, screen);
        color = vintage_color_correction(color);
        color *= crt_flicker(uv, time);

        if self.stages.vignette {
            color *= vignette_intensity(remapped, screen, params.vignette_opacity);
        }

        color *= scan_line_intensity(remapped.x, screen.y, params.scan_line_opacity.x);
        color *= scan_line_intensity(remapped.y, screen.x, params.scan_line_opacity.y);
        color *= enhanced_scanlines(remapped, screen, time);

        color *= edge_darkening(remapped);
        color *= corner_darkening(remapped);
        color += Vec3::splat(noise(uv, time));

        // The mask runs last and overrides everything computed above.
        if in_bounds(remapped) {
            color.extend(1.0)
        } else {
            OFF_SCREEN
        }
    }
}
