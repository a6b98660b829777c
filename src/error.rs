use std::path::PathBuf;

use crate::config::ExecutionTarget;

pub type Result<T> = std::result::Result<T, BackdropError>;

#[derive(thiserror::Error, Debug)]
pub enum BackdropError {
    #[error("inference backend unavailable: {0}")]
    BackendUnavailable(ExecutionTarget),

    #[error("failed to fetch model {}: {source}", path.display())]
    ModelFetch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model {model} failed to load (status {status})")]
    ModelLoad { model: String, status: i32 },

    #[error("inference failed (status {status})")]
    Inference { status: i32 },

    #[error("unsupported configuration: {0}")]
    UnsupportedCombination(String),

    #[error("frame is {actual:?} but the pipeline was built for {expected:?}")]
    ResolutionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error("segmenter error: {0}")]
    Segmenter(#[source] anyhow::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl BackdropError {
    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
