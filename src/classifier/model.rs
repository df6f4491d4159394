use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::preprocess::ImageTensor;

/// Spatial size the model expects its input resized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of f32 values in one NHWC RGB sample of this size.
    pub fn element_count(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Input size used by the deployed models and the demo stand-in.
pub const DEFAULT_INPUT_SIZE: InputSize = InputSize::new(224, 224);

/// Failures while preparing input, running inference or loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Image has no pixels")]
    EmptyImage,
    #[error("Input has {actual} values, model expects {expected}")]
    InputShape { expected: usize, actual: usize },
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Failed to read model {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid model file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Model rejected: {0}")]
    Invalid(String),
}

/// Opaque binary classifier: one preprocessed image in, one probability out.
///
/// Implementations are shared across worker threads and called with a batch of one.
pub trait DefectModel: Send + Sync + fmt::Debug {
    fn input_size(&self) -> InputSize;

    /// Raw output in `[0, 1]`; which label it is the probability of depends on the deployment.
    fn predict(&self, input: &ImageTensor) -> Result<f32, ModelError>;
}
