use image::RgbaImage;

use super::canvas::{premultiply, unpremultiply, Premul};

/// Gaussian blur with standard deviation `sigma` pixels, the way a canvas
/// blur filter applies it.
///
/// Colors are weighted by their alpha, so the transparent texels of a
/// mask layer never darken their neighbours. Edges are clamped.
pub fn gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    if !sigma.is_finite() || sigma <= 0.0 {
        return src.clone();
    }
    let kernel = kernel(sigma);
    let size = src.dimensions();
    let texels: Vec<Premul> = src.pixels().map(|px| premultiply(px, 1.0)).collect();

    let rows = convolve(&texels, size, &kernel, Axis::Horizontal);
    let blurred = convolve(&rows, size, &kernel, Axis::Vertical);
    RgbaImage::from_fn(size.0, size.1, |x, y| {
        unpremultiply(blurred[(y * size.0 + x) as usize])
    })
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Normalized weights for offsets `-3σ..=3σ`.
fn kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as i32;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|d| (-((d * d) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

fn convolve(src: &[Premul], (width, height): (u32, u32), kernel: &[f32], axis: Axis) -> Vec<Premul> {
    let (w, h) = (width as i32, height as i32);
    let radius = (kernel.len() / 2) as i32;
    let mut out = Vec::with_capacity(src.len());
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (k, weight) in kernel.iter().enumerate() {
                let d = k as i32 - radius;
                let (sx, sy) = match axis {
                    Axis::Horizontal => ((x + d).clamp(0, w - 1), y),
                    Axis::Vertical => (x, (y + d).clamp(0, h - 1)),
                };
                let texel = src[(sy * w + sx) as usize];
                for c in 0..4 {
                    acc[c] += weight * texel[c];
                }
            }
            out.push(acc);
        }
    }
    out
}
