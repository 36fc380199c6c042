//! Detection model interface and implementations

pub mod registry;
pub mod replay;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use registry::{ModelConfig, ModelRegistry, CLOTHES_MODEL, DEFAULT_MODEL};
pub use replay::ReplayModel;
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;

pub use crate::processing::decode::{OutputLayout, RawOutput};

use crate::error::VisionError;
use crate::processing::preprocess::Tensor;
use async_trait::async_trait;
use tracing::debug;

/// An inference engine turning a preprocessed tensor into raw detections.
#[async_trait]
pub trait DetectionModel: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, tensor: &Tensor) -> Result<RawOutput, VisionError>;

    /// Runs one inference on a constant input so the first real frame
    /// does not pay for lazy initialization.
    async fn warm_up(&self, input_width: u32, input_height: u32) -> Result<(), VisionError> {
        let dummy = Tensor::filled(input_width, input_height, 0.5);
        let output = self.infer(&dummy).await?;
        debug!(
            "Warm-up of {} produced {} candidates",
            self.name(),
            output.candidates()
        );
        Ok(())
    }
}
