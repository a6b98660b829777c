mod blur;
mod canvas;
mod pipeline;

pub use blur::gaussian_blur;
pub use canvas::{Canvas, CompositeOperation, Filter};
pub use pipeline::{draw_fallback_blur, CpuPipeline};
