mod background_blur;
mod background_image;
mod bilateral;
mod resize;
mod softmax;

pub use background_blur::BackgroundBlurStage;
pub use background_image::{cover_fit, BackgroundImageStage};
pub use bilateral::BilateralStage;
pub use resize::ResizeStage;
pub use softmax::SoftmaxStage;
