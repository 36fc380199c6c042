//! Error types for mirrorcam-eye

use thiserror::Error;
use mirrorcam_llm::LLMError;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Invalid frame: {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] LLMError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),
}

impl VisionError {
    /// Errors the frame loop drops and moves past.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            VisionError::InvalidFrame { .. } | VisionError::Inference(_) | VisionError::Ort(_)
        )
    }
}
