pub mod classifier;
pub mod orchestrator;
pub mod validator;

pub use classifier::{Classifier, ModelManager};
pub use orchestrator::Pipeline;
pub use validator::Validator;

use std::time::Duration;

/// A raw upload as received from a caller, before any decoding.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub declared_len: usize,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        let declared_len = bytes.len();
        Self {
            bytes,
            content_type: content_type.into(),
            declared_len,
        }
    }
}

/// A validated RGB pixel buffer, already downscaled to the configured bound.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: image::RgbImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// The classifier's verdict for one image. Immutable once produced and owned
/// by a single pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub duration: Duration,
}
