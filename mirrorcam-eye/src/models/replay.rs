//! Model that replays recorded outputs

use super::DetectionModel;
use crate::error::VisionError;
use crate::processing::decode::RawOutput;
use crate::processing::preprocess::Tensor;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use tracing::info;

/// Returns recorded outputs in order, wrapping around at the end.
///
/// An empty recording yields an empty output for every call.
pub struct ReplayModel {
    name: String,
    outputs: Vec<RawOutput>,
    columns: usize,
    cursor: Mutex<usize>,
}

impl ReplayModel {
    pub fn new(name: impl Into<String>, outputs: Vec<RawOutput>, columns: usize) -> Self {
        Self {
            name: name.into(),
            outputs,
            columns,
            cursor: Mutex::new(0),
        }
    }

    /// Loads a JSON array of recorded outputs.
    pub fn from_json_file(path: &Path, columns: usize) -> Result<Self, VisionError> {
        let content = std::fs::read_to_string(path)?;
        let outputs: Vec<RawOutput> = serde_json::from_str(&content).map_err(|e| {
            VisionError::Model(format!("Invalid replay file {}: {}", path.display(), e))
        })?;
        info!("Loaded {} recorded outputs from {:?}", outputs.len(), path);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "replay".to_string());
        Ok(Self::new(name, outputs, columns))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[async_trait]
impl DetectionModel for ReplayModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, _tensor: &Tensor) -> Result<RawOutput, VisionError> {
        if self.outputs.is_empty() {
            return Ok(RawOutput::empty(self.columns));
        }
        let mut cursor = self.cursor.lock();
        let output = self.outputs[*cursor].clone();
        *cursor = (*cursor + 1) % self.outputs.len();
        Ok(output)
    }
}
