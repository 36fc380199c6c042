//! ONNX Runtime backed YOLOv8 detector

use super::DetectionModel;
use crate::error::VisionError;
use crate::processing::decode::{OutputLayout, RawOutput};
use crate::processing::preprocess::Tensor;
use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Exported YOLOv8 detection graph (`[1, 3, H, W]` in, `[1, 4 + C, N]` out).
pub struct OnnxModel {
    name: String,
    session: Arc<Mutex<Session>>,
}

impl OnnxModel {
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::Model(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::Ort(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load model: {}", e)))?;

        info!("ONNX model loaded from {:?}", model_path);

        Ok(Self {
            name: model_name(model_path),
            session: Arc::new(Mutex::new(session)),
        })
    }
}

fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

#[async_trait]
impl DetectionModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, tensor: &Tensor) -> Result<RawOutput, VisionError> {
        let session = self.session.clone();
        let shape = tensor.shape();
        let data = tensor.data.clone();

        tokio::task::spawn_blocking(move || {
            let input = ort::value::Tensor::from_array((shape, data.into_boxed_slice()))
                .map_err(|e| VisionError::Ort(format!("Failed to build input tensor: {}", e)))?;

            let mut session = session.lock();
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| VisionError::Ort(format!("Inference failed: {}", e)))?;

            let (dims, values) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Ort(format!("Failed to read output tensor: {}", e)))?;

            let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
            debug!("Model output shape {:?}", dims);
            to_raw_output(&dims, values.to_vec())
        })
        .await
        .map_err(|e| VisionError::Inference(format!("Inference task panicked: {}", e)))?
    }
}

/// `[1, A, B]` with `A < B` is the channel-major YOLOv8 export.
fn to_raw_output(dims: &[usize], values: Vec<f32>) -> Result<RawOutput, VisionError> {
    let (a, b) = match dims {
        [1, a, b] | [a, b] => (*a, *b),
        other => {
            return Err(VisionError::Model(format!(
                "Unexpected output shape {:?}",
                other
            )))
        }
    };
    if a < b {
        RawOutput::new(values, b, a, OutputLayout::ChannelMajor)
    } else {
        RawOutput::new(values, a, b, OutputLayout::RowMajor)
    }
}
