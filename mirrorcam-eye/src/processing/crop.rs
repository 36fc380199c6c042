//! Confidence-gated crop extraction

use super::decode::Decoded;
use super::preprocess::Tensor;
use crate::error::VisionError;
use crate::frame::Frame;
use crate::models::ModelConfig;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const JPEG_QUALITY: u8 = 80;

/// Which picture crops are cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropSpace {
    /// The padded, resized image the model saw. Boxes are used as-is.
    #[default]
    Tensor,
    /// The original frame. Boxes are scaled back through the letterbox.
    Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub confidence_threshold: f32,
    pub space: CropSpace,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            space: CropSpace::Tensor,
        }
    }
}

/// Box of a crop in the space it was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub width: f32,
    pub height: f32,
}

/// JPEG-encoded sub-image of one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    pub id: String,
    pub class_name: String,
    pub confidence: f32,
    /// Percentage with one decimal, e.g. `"90.0"`.
    pub score: String,
    pub bbox: CropBox,
    pub jpeg: Bytes,
    pub created_at: DateTime<Utc>,
}

impl Crop {
    pub fn data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Cuts crops for target-class detections at or above the threshold.
#[derive(Debug, Clone)]
pub struct Cropper {
    config: CropConfig,
}

impl Cropper {
    pub fn new(config: CropConfig) -> Self {
        Self { config }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn config(&self) -> &CropConfig {
        &self.config
    }

    pub fn threshold(&self) -> f32 {
        self.config.confidence_threshold
    }

    /// Output order follows `detections`. Detections of other classes, below
    /// the threshold, or empty after clamping are skipped.
    pub fn crop(
        &self,
        frame: &Frame,
        tensor: &Tensor,
        detections: &Decoded,
        model: &ModelConfig,
    ) -> Result<Vec<Crop>, VisionError> {
        let mut crops = Vec::new();
        let source: &RgbImage = match self.config.space {
            CropSpace::Tensor => &tensor.image,
            CropSpace::Frame => frame.image(),
        };
        let (limit_x, limit_y) = (source.width() as f32, source.height() as f32);

        for index in 0..detections.len() {
            let class = detections.classes[index];
            let confidence = detections.scores[index];
            if class != model.target_class_index || !(confidence >= self.config.confidence_threshold) {
                continue;
            }

            let raw = detections.boxes[index];
            if ![raw.x1, raw.y1, raw.x2, raw.y2].iter().all(|v| v.is_finite()) {
                continue;
            }
            let (x1, y1, x2, y2) = match self.config.space {
                CropSpace::Tensor => (raw.x1, raw.y1, raw.x2, raw.y2),
                CropSpace::Frame => {
                    let g = &tensor.geometry;
                    (g.source_x(raw.x1), g.source_y(raw.y1), g.source_x(raw.x2), g.source_y(raw.y2))
                }
            };

            let x1 = x1.clamp(0.0, limit_x);
            let y1 = y1.clamp(0.0, limit_y);
            let x2 = x2.clamp(x1, limit_x);
            let y2 = y2.clamp(y1, limit_y);

            let px = x1.floor() as u32;
            let py = y1.floor() as u32;
            let pw = (x2.ceil() as u32).saturating_sub(px);
            let ph = (y2.ceil() as u32).saturating_sub(py);
            if pw == 0 || ph == 0 || x2 <= x1 || y2 <= y1 {
                debug!("Skipping detection {} with empty box after clamping", index);
                continue;
            }

            let sub = imageops::crop_imm(source, px, py, pw, ph).to_image();
            let jpeg = encode_jpeg(&sub)?;

            let class_name = model.label(class).unwrap_or("unknown").to_string();
            let created_at = Utc::now();
            crops.push(Crop {
                id: format!("{}_{}_{}", class_name, index, created_at.timestamp_millis()),
                class_name,
                confidence,
                score: format!("{:.1}", confidence * 100.0),
                bbox: CropBox {
                    x1,
                    y1,
                    x2,
                    y2,
                    width: x2 - x1,
                    height: y2 - y1,
                },
                jpeg,
                created_at,
            });
        }

        Ok(crops)
    }
}

fn encode_jpeg(image: &RgbImage) -> Result<Bytes, VisionError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(image)?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;
    use crate::processing::decode::BoundingBox;
    use crate::processing::preprocess::preprocess;
    use image::Rgb;

    fn person_model() -> ModelConfig {
        ModelRegistry::builtin().get("yolov8n").unwrap().clone()
    }

    fn one(bbox: BoundingBox, score: f32, class: usize) -> Decoded {
        Decoded {
            boxes: vec![bbox],
            scores: vec![score],
            classes: vec![class],
        }
    }

    #[test]
    fn test_single_target_crop() {
        let frame = Frame::new(RgbImage::from_pixel(100, 100, Rgb([200, 10, 10])));
        let tensor = preprocess(&frame, 100, 100).unwrap();
        let cropper = Cropper::new(CropConfig::default());

        let crops = cropper
            .crop(&frame, &tensor, &one(BoundingBox::new(10.0, 10.0, 50.0, 90.0), 0.9, 0), &person_model())
            .unwrap();

        assert_eq!(crops.len(), 1);
        let crop = &crops[0];
        assert_eq!(crop.score, "90.0");
        assert_eq!(crop.class_name, "person");
        assert!(crop.id.starts_with("person_0_"));
        assert_eq!(crop.bbox.width, 40.0);
        assert_eq!(crop.bbox.height, 80.0);

        let decoded = image::load_from_memory(&crop.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 80));
        assert!(crop.data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_other_class_and_low_score_dropped() {
        let frame = Frame::new(RgbImage::new(100, 100));
        let tensor = preprocess(&frame, 100, 100).unwrap();
        let cropper = Cropper::new(CropConfig::default());
        let detections = Decoded {
            boxes: vec![BoundingBox::new(0.0, 0.0, 10.0, 10.0); 3],
            scores: vec![0.95, 0.84, 0.85],
            classes: vec![2, 0, 0],
        };
        let crops = cropper.crop(&frame, &tensor, &detections, &person_model()).unwrap();
        assert_eq!(crops.len(), 1);
        assert!(crops[0].id.starts_with("person_2_"));
    }

    #[test]
    fn test_box_clamped_to_image() {
        let frame = Frame::new(RgbImage::new(100, 100));
        let tensor = preprocess(&frame, 100, 100).unwrap();
        let cropper = Cropper::new(CropConfig::default());
        let crops = cropper
            .crop(&frame, &tensor, &one(BoundingBox::new(-20.0, 80.0, 30.0, 130.0), 0.9, 0), &person_model())
            .unwrap();
        assert_eq!(crops[0].bbox, CropBox { x1: 0.0, y1: 80.0, x2: 30.0, y2: 100.0, width: 30.0, height: 20.0 });
    }

    #[test]
    fn test_fully_outside_box_skipped() {
        let frame = Frame::new(RgbImage::new(100, 100));
        let tensor = preprocess(&frame, 100, 100).unwrap();
        let cropper = Cropper::new(CropConfig::default());
        let crops = cropper
            .crop(&frame, &tensor, &one(BoundingBox::new(120.0, 0.0, 150.0, 50.0), 0.9, 0), &person_model())
            .unwrap();
        assert!(crops.is_empty());
    }

    #[test]
    fn test_frame_space_maps_back() {
        // 200x100 frame letterboxed into 100x100: tensor coordinates double.
        let frame = Frame::new(RgbImage::new(200, 100));
        let tensor = preprocess(&frame, 100, 100).unwrap();
        let cropper = Cropper::new(CropConfig {
            space: CropSpace::Frame,
            ..Default::default()
        });
        let crops = cropper
            .crop(&frame, &tensor, &one(BoundingBox::new(10.0, 10.0, 30.0, 40.0), 0.9, 0), &person_model())
            .unwrap();
        let bbox = crops[0].bbox;
        assert_eq!((bbox.x1, bbox.y1, bbox.x2, bbox.y2), (20.0, 20.0, 60.0, 80.0));
    }
}
