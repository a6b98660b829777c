//! Per-pixel compositing math shared by the shader stages.
//!
//! The WGSL stages evaluate exactly these formulas on the GPU; keeping a
//! scalar version here lets the numeric behavior be checked without an
//! adapter.

use image::RgbaImage;

use crate::config::{BackgroundKind, BlendMode, PostProcessingConfig};

/// Smallest denominator used where a range may collapse to zero.
pub const RANGE_EPSILON: f32 = 1e-6;

/// Coverage forced on the image stage when no background is shown.
pub const NO_BACKGROUND_COVERAGE: [f32; 2] = [0.0, 0.9999];

/// Stretches `[low, high]` of the raw mask onto `[0, 1]`.
pub fn coverage_remap(alpha: f32, [low, high]: [f32; 2]) -> f32 {
    ((alpha - low) / (high - low).max(RANGE_EPSILON)).clamp(0.0, 1.0)
}

pub fn screen(a: f32, b: f32) -> f32 {
    1.0 - (1.0 - a) * (1.0 - b)
}

pub fn linear_dodge(a: f32, b: f32) -> f32 {
    (a + b).min(1.0)
}

pub fn blend(mode: BlendMode, a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    let op = match mode {
        BlendMode::Screen => screen,
        BlendMode::LinearDodge => linear_dodge,
    };
    [op(a[0], b[0]), op(a[1], b[1]), op(a[2], b[2])]
}

/// How strongly the background bleeds onto a pixel with mask value `mask`.
///
/// Full strength inside the uncertain band, fading out above `high`.
pub fn light_wrap_mask(mask: f32, high: f32) -> f32 {
    1.0 - (mask - high).max(0.0) / (1.0 - high).max(RANGE_EPSILON)
}

/// Numeric parameters of the image background stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageCompositeParams {
    pub coverage: [f32; 2],
    pub light_wrapping: f32,
    pub blend_mode: BlendMode,
}

impl ImageCompositeParams {
    /// Parameters for `background`; with no background the stage is
    /// reused with coverage pinned near the full range and no light wrap.
    pub fn for_background(background: BackgroundKind, config: &PostProcessingConfig) -> Self {
        match background {
            BackgroundKind::None => Self {
                coverage: NO_BACKGROUND_COVERAGE,
                light_wrapping: 0.0,
                blend_mode: config.blend_mode,
            },
            _ => Self {
                coverage: config.coverage,
                light_wrapping: config.light_wrapping,
                blend_mode: config.blend_mode,
            },
        }
    }
}

/// Composites one foreground color over one background color.
///
/// Colors are linear RGB in [0, 1]; `mask` is the upsampled person mask.
pub fn composite_pixel(
    frame: [f32; 3],
    background: [f32; 3],
    mask: f32,
    params: &ImageCompositeParams,
) -> [f32; 3] {
    let mut color = frame;
    if params.light_wrapping > 0.0 {
        let strength = params.light_wrapping * light_wrap_mask(mask, params.coverage[1]);
        let wrap = background.map(|c| c * strength);
        color = blend(params.blend_mode, frame, wrap);
    }
    let alpha = coverage_remap(mask, params.coverage);
    [
        color[0] * alpha + background[0] * (1.0 - alpha),
        color[1] * alpha + background[1] * (1.0 - alpha),
        color[2] * alpha + background[2] * (1.0 - alpha),
    ]
}

/// Sampling pattern of the joint bilateral upsampler.
///
/// Derived the same way on both sides: the spatial sigma is scaled by
/// the frame-to-mask ratio, and large windows are sampled sparsely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    pub texel_size: [f32; 2],
    pub step: f32,
    pub radius: f32,
    pub offset: f32,
    pub sigma_texel: f32,
    pub sigma_color: f32,
}

const SPARSITY_FACTOR: f32 = 0.66;

impl BilateralParams {
    pub fn new(
        sigma_space: f32,
        sigma_color: f32,
        frame: (u32, u32),
        segmentation: (u32, u32),
    ) -> Self {
        let scale = (frame.0 as f32 / segmentation.0 as f32)
            .max(frame.1 as f32 / segmentation.1 as f32);
        let sigma = sigma_space * scale;
        let step = (sigma.sqrt() * SPARSITY_FACTOR).max(1.0);
        let offset = if step > 1.0 { step * 0.5 } else { 0.0 };
        let texel_size = [1.0 / frame.0 as f32, 1.0 / frame.1 as f32];
        Self {
            texel_size,
            step,
            radius: sigma,
            offset,
            sigma_texel: texel_size[0].max(texel_size[1]) * sigma,
            sigma_color,
        }
    }
}

fn gaussian(distance: f32, sigma: f32) -> f32 {
    (-(distance * distance) / (2.0 * sigma * sigma + RANGE_EPSILON)).exp()
}

fn sample_nearest(width: u32, height: u32, uv: [f32; 2]) -> (u32, u32) {
    let x = (uv[0] * width as f32).floor().clamp(0.0, width.saturating_sub(1) as f32) as u32;
    let y = (uv[1] * height as f32).floor().clamp(0.0, height.saturating_sub(1) as f32) as u32;
    (x, y)
}

/// Scalar reference of the joint bilateral upsampling stage.
///
/// `mask` is row-major at `mask_size`; `guide` is the full resolution
/// frame. Samples use nearest lookup. Returns one value per guide pixel;
/// a mask with no texels (or fewer than `mask_size` holds) counts as all
/// background.
pub fn joint_bilateral_filter(
    mask: &[f32],
    mask_size: (u32, u32),
    guide: &RgbaImage,
    params: &BilateralParams,
) -> Vec<f32> {
    let (width, height) = guide.dimensions();
    let texels = mask_size.0 as usize * mask_size.1 as usize;
    if texels == 0 || mask.len() < texels {
        return vec![0.0; width as usize * height as usize];
    }
    let color_at = |uv: [f32; 2]| {
        let (x, y) = sample_nearest(width, height, uv);
        let p = guide.get_pixel(x, y).0;
        [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0]
    };
    let mask_at = |uv: [f32; 2]| {
        let (x, y) = sample_nearest(mask_size.0, mask_size.1, uv);
        mask[(y * mask_size.0 + x) as usize]
    };

    let mut out = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let center = [
                (x as f32 + 0.5) * params.texel_size[0],
                (y as f32 + 0.5) * params.texel_size[1],
            ];
            let center_color = color_at(center);
            let mut total_weight = 0.0;
            let mut value = 0.0;

            let mut i = -params.radius + params.offset;
            while i <= params.radius {
                let mut j = -params.radius + params.offset;
                while j <= params.radius {
                    let shift = [j * params.texel_size[0], i * params.texel_size[1]];
                    let coord = [center[0] + shift[0], center[1] + shift[1]];
                    let color = color_at(coord);
                    let color_distance = ((color[0] - center_color[0]).powi(2)
                        + (color[1] - center_color[1]).powi(2)
                        + (color[2] - center_color[2]).powi(2))
                    .sqrt();
                    let space_distance = (shift[0] * shift[0] + shift[1] * shift[1]).sqrt();
                    let weight = gaussian(space_distance, params.sigma_texel)
                        * gaussian(color_distance, params.sigma_color);
                    total_weight += weight;
                    value += weight * mask_at(coord);
                    j += params.step;
                }
                i += params.step;
            }
            out.push(if total_weight > 0.0 {
                value / total_weight
            } else {
                mask_at(center)
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_scenario_values() {
        let coverage = [0.5, 0.75];
        assert_eq!(coverage_remap(0.5, coverage), 0.0);
        assert_eq!(coverage_remap(0.75, coverage), 1.0);
        assert_eq!(coverage_remap(0.625, coverage), 0.5);
    }

    #[test]
    fn blend_modes_match_their_definitions() {
        assert!((screen(0.5, 0.5) - 0.75).abs() < 1e-6);
        assert_eq!(linear_dodge(0.7, 0.6), 1.0);
        assert_eq!(
            blend(BlendMode::LinearDodge, [0.25, 0.5, 0.875], [0.25, 0.25, 0.25]),
            [0.5, 0.75, 1.0]
        );
    }

    #[test]
    fn no_background_pins_coverage_and_disables_wrap() {
        let config = PostProcessingConfig::default();
        let params = ImageCompositeParams::for_background(BackgroundKind::None, &config);
        assert_eq!(params.coverage, NO_BACKGROUND_COVERAGE);
        assert_eq!(params.light_wrapping, 0.0);

        let params = ImageCompositeParams::for_background(BackgroundKind::Image, &config);
        assert_eq!(params.coverage, config.coverage);
    }

    #[test]
    fn light_wrap_fades_above_high_coverage() {
        assert_eq!(light_wrap_mask(0.3, 0.75), 1.0);
        assert_eq!(light_wrap_mask(1.0, 0.75), 0.0);
        assert!((light_wrap_mask(0.875, 0.75) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn opaque_person_keeps_frame_color_without_wrap() {
        let params = ImageCompositeParams {
            coverage: [0.5, 0.75],
            light_wrapping: 0.0,
            blend_mode: BlendMode::Screen,
        };
        let out = composite_pixel([0.2, 0.4, 0.6], [1.0, 0.0, 0.0], 1.0, &params);
        assert_eq!(out, [0.2, 0.4, 0.6]);
        let out = composite_pixel([0.2, 0.4, 0.6], [1.0, 0.0, 0.0], 0.1, &params);
        assert_eq!(out, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_mask_upsamples_to_background() {
        let guide = RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        let params = BilateralParams::new(1.0, 0.1, (4, 3), (2, 2));
        assert_eq!(joint_bilateral_filter(&[], (0, 2), &guide, &params), vec![0.0; 12]);
        assert_eq!(joint_bilateral_filter(&[], (2, 0), &guide, &params), vec![0.0; 12]);
        assert_eq!(joint_bilateral_filter(&[1.0], (2, 2), &guide, &params), vec![0.0; 12]);
    }

    #[test]
    fn bilateral_params_scale_with_resolution_ratio() {
        let params = BilateralParams::new(1.0, 0.1, (640, 384), (160, 96));
        assert_eq!(params.radius, 4.0);
        assert_eq!(params.step, 1.32);
        assert!((params.offset - 0.66).abs() < 1e-6);
        assert!((params.sigma_texel - 4.0 / 384.0).abs() < 1e-7);
    }

    #[test]
    fn bilateral_keeps_constant_mask() {
        let guide = RgbaImage::from_fn(8, 8, |x, _| image::Rgba([(x * 30) as u8, 0, 0, 255]));
        let mask = vec![0.4; 16];
        let params = BilateralParams::new(1.0, 0.1, (8, 8), (4, 4));
        let out = joint_bilateral_filter(&mask, (4, 4), &guide, &params);
        assert!(out.iter().all(|v| (v - 0.4).abs() < 1e-5));
    }

    #[test]
    fn bilateral_respects_color_edges() {
        // left half dark, right half bright; mask only covers the bright half
        let guide = RgbaImage::from_fn(16, 4, |x, _| {
            let v = if x < 8 { 10 } else { 240 };
            image::Rgba([v, v, v, 255])
        });
        let mask: Vec<f32> = (0..8 * 2).map(|i| if i % 8 >= 4 { 1.0 } else { 0.0 }).collect();
        let params = BilateralParams::new(2.0, 0.1, (16, 4), (8, 2));
        let out = joint_bilateral_filter(&mask, (8, 2), &guide, &params);
        // pixels right next to the edge stay on their own side
        assert!(out[7] < 0.05);
        assert!(out[8] > 0.95);
    }
}
