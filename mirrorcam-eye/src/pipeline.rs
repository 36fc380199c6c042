//! Per-frame detection pipeline: preprocess, infer, decode, suppress, crop

use crate::error::VisionError;
use crate::frame::Frame;
use crate::models::{DetectionModel, ModelConfig};
use crate::processing::{
    decode, non_max_suppression, preprocess, Crop, CropConfig, Cropper, Decoded, NmsParams, Tensor,
};
use std::sync::Arc;
use tracing::debug;

/// Kept detections of one frame, in tensor coordinates.
#[derive(Debug, Clone)]
pub struct FrameDetections {
    pub tensor: Tensor,
    pub detections: Decoded,
}

pub struct DetectionPipeline {
    model: Arc<dyn DetectionModel>,
    model_config: ModelConfig,
    nms: NmsParams,
    cropper: Cropper,
}

impl DetectionPipeline {
    pub fn new(
        model: Arc<dyn DetectionModel>,
        model_config: ModelConfig,
        nms: NmsParams,
        crop: CropConfig,
    ) -> Self {
        Self {
            model,
            model_config,
            nms,
            cropper: Cropper::new(crop),
        }
    }

    /// Replaces the crop threshold, e.g. with a capture policy's
    /// [`crop_threshold`](crate::capture::CapturePolicyConfig::crop_threshold).
    pub fn with_crop_threshold(mut self, threshold: f32) -> Self {
        self.cropper = self.cropper.with_threshold(threshold);
        self
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn crop_threshold(&self) -> f32 {
        self.cropper.threshold()
    }

    pub async fn warm_up(&self) -> Result<(), VisionError> {
        self.model
            .warm_up(self.model_config.input_width, self.model_config.input_height)
            .await
    }

    /// Runs everything up to and including suppression.
    pub async fn detect(&self, frame: &Frame) -> Result<FrameDetections, VisionError> {
        let tensor = preprocess(
            frame,
            self.model_config.input_width,
            self.model_config.input_height,
        )?;
        // whatever the engine reports, it only costs this frame
        let raw = self.model.infer(&tensor).await.map_err(|e| match e {
            VisionError::Inference(_) => e,
            other => VisionError::Inference(format!("{} failed: {}", self.model.name(), other)),
        })?;
        let decoded = decode(&raw, self.model_config.num_classes())?;
        let keep = non_max_suppression(&decoded.boxes, &decoded.scores, &self.nms);
        debug!(
            "{} candidates decoded, {} kept after suppression",
            decoded.len(),
            keep.len()
        );
        Ok(FrameDetections {
            detections: decoded.gather(&keep),
            tensor,
        })
    }

    /// Crops of the target class for one frame.
    pub async fn process_frame(&self, frame: &Frame) -> Result<Vec<Crop>, VisionError> {
        let FrameDetections { tensor, detections } = self.detect(frame).await?;
        self.cropper.crop(frame, &tensor, &detections, &self.model_config)
    }
}
