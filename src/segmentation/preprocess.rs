use image::{imageops, RgbaImage};

/// Downsamples a frame to segmentation resolution.
///
/// Bilinear is enough here; the mask is refined later and this runs
/// every frame.
pub fn downsample(frame: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let _span = tracing::debug_span!("downsample").entered();
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, imageops::FilterType::Triangle)
}

/// Writes RGBA bytes as interleaved RGB floats normalized to [0, 1].
///
/// `input` must hold three floats per pixel of `rgba`.
pub fn write_rgb_input(rgba: &[u8], input: &mut [f32]) {
    for (pixel, dst) in rgba.chunks_exact(4).zip(input.chunks_exact_mut(3)) {
        dst[0] = pixel[0] as f32 / 255.0;
        dst[1] = pixel[1] as f32 / 255.0;
        dst[2] = pixel[2] as f32 / 255.0;
    }
}

/// Stores a mask value in [0, 1] in the alpha channel, leaving RGB black.
pub fn alpha_from_mask(value: f32) -> image::Rgba<u8> {
    image::Rgba([0, 0, 0, (value * 255.0).round().clamp(0.0, 255.0) as u8])
}
