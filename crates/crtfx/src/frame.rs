use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::{UVec2, Vec4};
use image::imageops::flip_vertical_in_place;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::pipeline::Pipeline;
use crate::texture::Sampler;

/// Floating-point output of one pipeline pass, bottom row first.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    /// Pixel at `(x, y)` with a bottom-left origin.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Vec4> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Clamps to `[0, 1]`, quantises to 8 bits and flips to a top-left origin.
    ///
    /// Non-finite channels quantise to zero.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut image = RgbaImage::from_fn(self.width, self.height, |x, y| {
            let color = self.pixels[y as usize * self.width as usize + x as usize];
            Rgba(color.to_array().map(quantize))
        });
        flip_vertical_in_place(&mut image);
        image
    }

    /// Writes the frame as a PNG, creating parent directories as needed.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to prepare output directory {}", parent.display())
            })?;
        }
        self.to_rgba_image()
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write frame to {}", path.display()))?;
        Ok(())
    }
}

fn quantize(channel: f32) -> u8 {
    if channel.is_nan() {
        return 0;
    }
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Evaluates `pipeline` for every pixel of a `width` x `height` target.
///
/// Rows are distributed over the rayon pool; each pixel is independent and
/// every one of them sees the same `time` and `source` snapshot.
pub fn render_frame<S>(
    pipeline: &Pipeline,
    source: &S,
    time: f32,
    width: u32,
    height: u32,
) -> Frame
where
    S: Sampler + ?Sized,
{
    let output = UVec2::new(width, height);
    let mut pixels = vec![Vec4::ZERO; width as usize * height as usize];
    if width > 0 {
        pixels
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(row, line)| {
                for (column, pixel) in line.iter_mut().enumerate() {
                    let index = UVec2::new(column as u32, row as u32);
                    *pixel = pipeline.render(index, output, time, source);
                }
            });
    }

    Frame {
        width,
        height,
        pixels,
    }
}
