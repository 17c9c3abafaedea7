use std::path::Path;

use anyhow::{Context, Result};
use glam::{Vec2, Vec4};
use image::imageops::flip_vertical_in_place;
use image::{Rgba, RgbaImage};

/// Read-only source the pipeline samples from.
///
/// Implementations must return a defined colour for every coordinate,
/// including ones outside `[0, 1]` and non-finite ones.
pub trait Sampler: Send + Sync {
    fn sample(&self, uv: Vec2) -> Vec4;
}

/// Bars used by [`SourceTexture::test_pattern`], left to right.
const TEST_PATTERN_BARS: [[u8; 3]; 7] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
];

/// Immutable RGBA texel grid with bilinear, clamp-to-edge sampling.
///
/// Rows are stored bottom first so that `v = 0` addresses the bottom of the
/// picture, the same orientation fragment coordinates use.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTexture {
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

impl SourceTexture {
    /// Uploads an 8-bit image (top row first) as a texture.
    ///
    /// Images without pixels are rejected; every texture has at least one texel.
    pub fn from_rgba_image(image: RgbaImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!(
                "source image has no pixels ({}x{})",
                image.width(),
                image.height()
            );
        }
        Ok(Self::upload(image))
    }

    fn upload(mut image: RgbaImage) -> Self {
        flip_vertical_in_place(&mut image);
        let (width, height) = image.dimensions();
        let texels = image
            .pixels()
            .map(|pixel| Vec4::from_array(pixel.0.map(|c| c as f32 / 255.0)))
            .collect();
        Self {
            width,
            height,
            texels,
        }
    }

    /// Decodes an image file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to open source image {}", path.display()))?
            .to_rgba8();
        tracing::debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded source image"
        );
        Self::from_rgba_image(image)
            .with_context(|| format!("failed to load source image {}", path.display()))
    }

    /// Single texel of `color`; sampling anywhere returns it unchanged.
    pub fn solid(color: Vec4) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color],
        }
    }

    /// Colour bars over a grey ramp, used when no input was supplied.
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let bars_end = height * 2 / 3;
        let image = RgbaImage::from_fn(width, height, |x, y| {
            if y < bars_end {
                let bar = (x as usize * TEST_PATTERN_BARS.len()) / width as usize;
                let [r, g, b] = TEST_PATTERN_BARS[bar.min(TEST_PATTERN_BARS.len() - 1)];
                Rgba([r, g, b, 255])
            } else {
                let level = ((x as f32 + 0.5) / width as f32 * 255.0).round() as u8;
                Rgba([level, level, level, 255])
            }
        });
        Self::upload(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel at integer coordinates, bottom-left origin, clamped to the edge.
    pub fn texel(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texels[y * self.width as usize + x]
    }
}

impl Sampler for SourceTexture {
    fn sample(&self, uv: Vec2) -> Vec4 {
        let uv = Vec2::new(clamp_coordinate(uv.x), clamp_coordinate(uv.y));
        let size = Vec2::new(self.width as f32, self.height as f32);
        let position = uv * size - 0.5;
        let base = position.floor();
        let weight = position - base;
        let x0 = base.x as i64;
        let y0 = base.y as i64;

        let bottom = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), weight.x);
        let top = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), weight.x);
        bottom.lerp(top, weight.y)
    }
}

fn clamp_coordinate(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
