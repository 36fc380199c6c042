//! Static descriptions of the supported detector variants

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Clothing detector classes
pub const CLOTHES_CLASSES: &[&str] = &["accessories", "bags", "clothing", "shoes"];

pub const DEFAULT_MODEL: &str = "yolov8n";
pub const CLOTHES_MODEL: &str = "yolov8n_clothes";

/// Label set, target class and input geometry of one model variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub display_name: String,
    pub labels: Vec<String>,
    pub target_class: String,
    pub target_class_index: usize,
    pub input_width: u32,
    pub input_height: u32,
}

impl ModelConfig {
    pub fn new(
        name: &str,
        display_name: &str,
        labels: &[&str],
        target_class: &str,
        input_width: u32,
        input_height: u32,
    ) -> Option<Self> {
        let target_class_index = labels.iter().position(|l| *l == target_class)?;
        Some(Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            target_class: target_class.to_string(),
            target_class_index,
            input_width,
            input_height,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn label(&self, class_index: usize) -> Option<&str> {
        self.labels.get(class_index).map(|s| s.as_str())
    }
}

/// Name-keyed lookup of model variants.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// Registry holding the COCO and clothing detectors.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let coco = ModelConfig {
            name: DEFAULT_MODEL.to_string(),
            display_name: "YOLOv8n (COCO)".to_string(),
            labels: COCO_CLASSES.iter().map(|l| l.to_string()).collect(),
            target_class: "person".to_string(),
            target_class_index: 0,
            input_width: 640,
            input_height: 640,
        };
        let clothes = ModelConfig {
            name: CLOTHES_MODEL.to_string(),
            display_name: "YOLOv8n Clothes".to_string(),
            labels: CLOTHES_CLASSES.iter().map(|l| l.to_string()).collect(),
            target_class: "clothing".to_string(),
            target_class_index: 2,
            input_width: 640,
            input_height: 640,
        };
        registry.register(coco);
        registry.register(clothes);
        registry
    }

    pub fn register(&mut self, config: ModelConfig) {
        self.models.insert(config.name.clone(), config);
    }

    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Unknown names fall back to the COCO model.
    pub fn get_or_default(&self, name: &str) -> Option<&ModelConfig> {
        self.get(name).or_else(|| {
            tracing::warn!("Unknown model '{}', falling back to {}", name, DEFAULT_MODEL);
            self.get(DEFAULT_MODEL)
        })
    }

    pub fn available_models(&self) -> Vec<&str> {
        self.models.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_models() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.available_models(), vec!["yolov8n", "yolov8n_clothes"]);

        let clothes = registry.get("yolov8n_clothes").unwrap();
        assert_eq!(clothes.target_class, "clothing");
        assert_eq!(clothes.target_class_index, 2);
        assert_eq!(clothes.label(2), Some("clothing"));
        assert_eq!((clothes.input_width, clothes.input_height), (640, 640));

        let coco = registry.get("yolov8n").unwrap();
        assert_eq!(coco.num_classes(), 80);
        assert_eq!(coco.label(coco.target_class_index), Some("person"));
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let registry = ModelRegistry::builtin();
        assert!(registry.get("yolov9").is_none());
        assert_eq!(registry.get_or_default("yolov9").unwrap().name, "yolov8n");
    }

    #[test]
    fn test_model_config_new_resolves_index() {
        let config = ModelConfig::new("tiny", "Tiny", &["cat", "dog"], "dog", 320, 320).unwrap();
        assert_eq!(config.target_class_index, 1);
        assert!(ModelConfig::new("tiny", "Tiny", &["cat"], "dog", 320, 320).is_none());
    }
}
