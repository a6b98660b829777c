use backdrop::compose::{
    blend, composite_pixel, coverage_remap, joint_bilateral_filter, light_wrap_mask, screen,
    BilateralParams, ImageCompositeParams,
};
use backdrop::segmentation::stable_softmax;
use backdrop::BlendMode;
use image::{Rgba, RgbaImage};
use proptest::prelude::*;

#[test]
fn prop_softmax_is_a_probability() {
    proptest!(|(background in -1.0e4f32..1.0e4, person in -1.0e4f32..1.0e4)| {
        let p = stable_softmax(background, person);
        prop_assert!(p.is_finite());
        prop_assert!((0.0..=1.0).contains(&p));
    });
}

#[test]
fn prop_softmax_is_shift_invariant() {
    proptest!(|(background in -20.0f32..20.0, person in -20.0f32..20.0, shift in -1000.0f32..1000.0)| {
        let base = stable_softmax(background, person);
        let shifted = stable_softmax(background + shift, person + shift);
        prop_assert!((base - shifted).abs() < 1e-4, "{} vs {}", base, shifted);
        prop_assert!((base + stable_softmax(person, background) - 1.0).abs() < 1e-5);
    });
}

#[test]
fn prop_coverage_is_monotone_and_saturating() {
    proptest!(|(low in 0.0f32..0.5, high in 0.5f32..1.0, a in 0.0f32..1.0, b in 0.0f32..1.0)| {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(coverage_remap(lo, [low, high]) <= coverage_remap(hi, [low, high]));
        prop_assert_eq!(coverage_remap(low.min(a), [low, high]), 0.0);
        prop_assert_eq!(coverage_remap(high.max(a), [low, high]), 1.0);
    });
}

#[test]
fn prop_collapsed_coverage_is_a_step() {
    proptest!(|(edge in 0.0f32..1.0, a in 0.0f32..1.0)| {
        let value = coverage_remap(a, [edge, edge]);
        prop_assert!(value.is_finite());
        prop_assert!(value == 0.0 || value == 1.0 || (a - edge).abs() < 1e-6);
    });
}

#[test]
fn prop_blends_keep_black_and_stay_in_range() {
    proptest!(|(a in prop::array::uniform3(0.0f32..=1.0), b in prop::array::uniform3(0.0f32..=1.0))| {
        for mode in [BlendMode::Screen, BlendMode::LinearDodge] {
            let unchanged = blend(mode, a, [0.0; 3]);
            let out = blend(mode, a, b);
            for c in 0..3 {
                prop_assert!((unchanged[c] - a[c]).abs() < 1e-6);
                prop_assert!(out[c] >= a[c] - 1e-6 && out[c] <= 1.0 + 1e-6);
            }
        }
        prop_assert!((screen(a[0], b[0]) - screen(b[0], a[0])).abs() < 1e-6);
    });
}

#[test]
fn prop_light_wrap_fades_above_high_coverage() {
    proptest!(|(high in 0.0f32..0.99, mask in 0.0f32..=1.0)| {
        let wrap = light_wrap_mask(mask, high);
        prop_assert!((-1e-5..=1.0 + 1e-6).contains(&wrap));
        if mask <= high {
            prop_assert_eq!(wrap, 1.0);
        }
        prop_assert!(light_wrap_mask(1.0, high).abs() < 1e-5);
    });
}

#[test]
fn prop_zero_light_wrap_is_plain_mix() {
    proptest!(|(
        frame in prop::array::uniform3(0.0f32..1.0),
        background in prop::array::uniform3(0.0f32..1.0),
        mask in 0.0f32..1.0,
        low in 0.0f32..0.5,
        high in 0.5f32..1.0
    )| {
        let alpha = coverage_remap(mask, [low, high]);
        let expected = [0, 1, 2].map(|c| frame[c] * alpha + background[c] * (1.0 - alpha));
        for blend_mode in [BlendMode::Screen, BlendMode::LinearDodge] {
            let params = ImageCompositeParams {
                coverage: [low, high],
                light_wrapping: 0.0,
                blend_mode,
            };
            prop_assert_eq!(composite_pixel(frame, background, mask, &params), expected);
        }
    });
}

#[test]
fn prop_tiny_bilateral_sigma_is_nearest_upsampling() {
    proptest!(|(
        mask_width in 1u32..6,
        mask_height in 1u32..6,
        scale in 1u32..4,
        seed in any::<u64>()
    )| {
        let values: Vec<f32> = (0..mask_width * mask_height)
            .map(|i| ((seed >> (i % 64)) & 0xff) as f32 / 255.0)
            .collect();
        let (width, height) = (mask_width * scale, mask_height * scale);
        let guide = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 40 % 256) as u8, (y * 60 % 256) as u8, (seed % 256) as u8, 255])
        });
        let params = BilateralParams::new(1e-4, 0.1, (width, height), (mask_width, mask_height));
        let filtered = joint_bilateral_filter(&values, (mask_width, mask_height), &guide, &params);

        for y in 0..height {
            for x in 0..width {
                let expected = values[((y / scale) * mask_width + x / scale) as usize];
                prop_assert!((filtered[(y * width + x) as usize] - expected).abs() < 1e-6);
            }
        }
    });
}
