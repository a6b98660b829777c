use image::{imageops, Rgba, RgbaImage};

use super::blur::gaussian_blur;

/// Porter-Duff operators used by the raster compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOperation {
    /// Replace the destination, clearing pixels the source does not cover
    Copy,
    SourceOver,
    /// Keep the source only where the destination is opaque
    SourceIn,
    /// Paint behind existing content
    DestinationOver,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    None,
    /// Gaussian blur, standard deviation in pixels
    Blur(f32),
}

/// Minimal 2D drawing context over an RGBA surface.
///
/// Pixels are stored straight-alpha; blending happens in premultiplied
/// floats. When `supports_filter` is false, filters are silently ignored,
/// mirroring environments without filtered drawing.
pub struct Canvas<'s> {
    surface: &'s mut RgbaImage,
    operation: CompositeOperation,
    global_alpha: f32,
    filter: Filter,
    supports_filter: bool,
}

pub(super) type Premul = [f32; 4];

pub(super) fn premultiply(px: &Rgba<u8>, global_alpha: f32) -> Premul {
    let a = px[3] as f32 / 255.0 * global_alpha;
    [
        px[0] as f32 / 255.0 * a,
        px[1] as f32 / 255.0 * a,
        px[2] as f32 / 255.0 * a,
        a,
    ]
}

pub(super) fn unpremultiply(p: Premul) -> Rgba<u8> {
    let a = p[3].clamp(0.0, 1.0);
    if a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |c: f32| ((c / a).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba([
        channel(p[0]),
        channel(p[1]),
        channel(p[2]),
        (a * 255.0).round() as u8,
    ])
}

fn composite(op: CompositeOperation, src: Option<Premul>, dst: Premul) -> Premul {
    match (op, src) {
        (CompositeOperation::Copy, Some(s)) => s,
        (CompositeOperation::Copy, None) => [0.0; 4],
        (CompositeOperation::SourceOver, Some(s)) => {
            let k = 1.0 - s[3];
            [s[0] + dst[0] * k, s[1] + dst[1] * k, s[2] + dst[2] * k, s[3] + dst[3] * k]
        }
        (CompositeOperation::SourceIn, Some(s)) => s.map(|c| c * dst[3]),
        (CompositeOperation::SourceIn, None) => [0.0; 4],
        (CompositeOperation::DestinationOver, Some(s)) => {
            let k = 1.0 - dst[3];
            [dst[0] + s[0] * k, dst[1] + s[1] * k, dst[2] + s[2] * k, dst[3] + s[3] * k]
        }
        (CompositeOperation::SourceOver | CompositeOperation::DestinationOver, None) => dst,
    }
}

impl<'s> Canvas<'s> {
    pub fn new(surface: &'s mut RgbaImage, supports_filter: bool) -> Self {
        Self {
            surface,
            operation: CompositeOperation::SourceOver,
            global_alpha: 1.0,
            filter: Filter::None,
            supports_filter,
        }
    }

    pub fn supports_filter(&self) -> bool {
        self.supports_filter
    }

    pub fn set_composite_operation(&mut self, operation: CompositeOperation) {
        self.operation = operation;
    }

    /// Values outside [0, 1] are clamped.
    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.global_alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_filter(&mut self, filter: Filter) {
        if self.supports_filter {
            self.filter = filter;
        }
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Draws `image` stretched over the whole surface.
    pub fn draw_image_stretched(&mut self, image: &RgbaImage) {
        let (width, height) = self.surface.dimensions();
        if image.dimensions() == (width, height) {
            self.draw_image(image, 0, 0);
        } else {
            let scaled = imageops::resize(image, width, height, imageops::FilterType::Triangle);
            self.draw_image(&scaled, 0, 0);
        }
    }

    /// Draws `image` unscaled with its top-left corner at (`dx`, `dy`).
    pub fn draw_image(&mut self, image: &RgbaImage, dx: i32, dy: i32) {
        let filtered;
        let image = match self.filter {
            Filter::Blur(sigma) => {
                filtered = gaussian_blur(image, sigma);
                &filtered
            }
            Filter::None => image,
        };

        let (src_w, src_h) = (image.width() as i32, image.height() as i32);
        let operation = self.operation;
        let global_alpha = self.global_alpha;
        for (x, y, dst) in self.surface.enumerate_pixels_mut() {
            let sx = x as i32 - dx;
            let sy = y as i32 - dy;
            let src = (sx >= 0 && sy >= 0 && sx < src_w && sy < src_h)
                .then(|| premultiply(image.get_pixel(sx as u32, sy as u32), global_alpha));
            let out = composite(operation, src, premultiply(dst, 1.0));
            *dst = unpremultiply(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    #[test]
    fn copy_clears_uncovered_pixels() {
        let mut surface = RgbaImage::from_pixel(4, 4, BLUE);
        let src = RgbaImage::from_pixel(2, 2, RED);
        let mut canvas = Canvas::new(&mut surface, true);
        canvas.set_composite_operation(CompositeOperation::Copy);
        canvas.draw_image(&src, 0, 0);
        assert_eq!(*surface.get_pixel(1, 1), RED);
        assert_eq!(*surface.get_pixel(3, 3), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn source_in_takes_destination_alpha() {
        let mut surface = RgbaImage::from_fn(2, 1, |x, _| Rgba([0, 0, 0, if x == 0 { 255 } else { 0 }]));
        let src = RgbaImage::from_pixel(2, 1, RED);
        let mut canvas = Canvas::new(&mut surface, true);
        canvas.set_composite_operation(CompositeOperation::SourceIn);
        canvas.draw_image(&src, 0, 0);
        assert_eq!(*surface.get_pixel(0, 0), RED);
        assert_eq!(surface.get_pixel(1, 0)[3], 0);
    }

    #[test]
    fn destination_over_fills_only_transparency() {
        let mut surface = RgbaImage::from_fn(2, 1, |x, _| if x == 0 { RED } else { Rgba([0, 0, 0, 0]) });
        let src = RgbaImage::from_pixel(2, 1, BLUE);
        let mut canvas = Canvas::new(&mut surface, true);
        canvas.set_composite_operation(CompositeOperation::DestinationOver);
        canvas.draw_image(&src, 0, 0);
        assert_eq!(*surface.get_pixel(0, 0), RED);
        assert_eq!(*surface.get_pixel(1, 0), BLUE);
    }

    #[test]
    fn offset_draw_leaves_edges_untouched() {
        let mut surface = RgbaImage::new(4, 1);
        let src = RgbaImage::from_pixel(4, 1, RED);
        let mut canvas = Canvas::new(&mut surface, true);
        canvas.draw_image(&src, 2, 0);
        assert_eq!(surface.get_pixel(1, 0)[3], 0);
        assert_eq!(*surface.get_pixel(2, 0), RED);
    }

    #[test]
    fn filter_is_ignored_without_support() {
        let mut surface = RgbaImage::new(5, 1);
        let mut src = RgbaImage::new(5, 1);
        src.put_pixel(2, 0, RED);
        let mut canvas = Canvas::new(&mut surface, false);
        canvas.set_composite_operation(CompositeOperation::Copy);
        canvas.set_filter(Filter::Blur(2.0));
        canvas.draw_image(&src, 0, 0);
        assert_eq!(surface, src);
    }

    #[test]
    fn global_alpha_scales_source() {
        let mut surface = RgbaImage::new(1, 1);
        let src = RgbaImage::from_pixel(1, 1, RED);
        let mut canvas = Canvas::new(&mut surface, true);
        canvas.set_global_alpha(0.5);
        canvas.draw_image(&src, 0, 0);
        assert_eq!(*surface.get_pixel(0, 0), Rgba([255, 0, 0, 128]));
    }
}
