//! Configuration for mirrorcam

use crate::capture::{CapturePolicyConfig, CapturePreset};
use crate::error::VisionError;
use crate::models::DEFAULT_MODEL;
use crate::processing::{CropConfig, NmsParams};
use mirrorcam_llm::{AnalysisConfig, Provider, DEFAULT_BACKEND_URL, DEFAULT_OPENAI_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Which detector to run and where its weights or recordings live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Registry name, e.g. `yolov8n_clothes`.
    pub name: String,
    /// ONNX weights (requires the `onnx` feature).
    pub path: Option<PathBuf>,
    /// JSON file of recorded raw outputs, used instead of `path`.
    pub replay: Option<PathBuf>,
    pub warm_up: bool,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            path: None,
            replay: None,
            warm_up: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLoopConfig {
    /// Target frame rate (frames per second)
    pub fps: u32,
    /// Pause after a frame that could not be processed.
    pub not_ready_backoff_ms: u64,
    /// Stop after this many frames even if nothing was captured.
    pub max_frames: Option<u64>,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            not_ready_backoff_ms: 100,
            max_frames: None,
        }
    }
}

impl FrameLoopConfig {
    pub fn not_ready_backoff(&self) -> Duration {
        Duration::from_millis(self.not_ready_backoff_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorcamConfig {
    /// Named policy; when set it replaces `policy` on load.
    pub preset: Option<CapturePreset>,
    pub model: ModelSection,
    pub nms: NmsParams,
    pub crop: CropConfig,
    pub policy: CapturePolicyConfig,
    pub analysis: AnalysisConfig,
    pub frame_loop: FrameLoopConfig,
}

impl MirrorcamConfig {
    /// Parse a TOML file. Missing sections and fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, VisionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VisionError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: MirrorcamConfig = toml::from_str(&content)?;
        if let Some(preset) = config.preset {
            config.policy = preset.config();
        }
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// File (or defaults), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, VisionError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        info!(
            "Configuration: model={}, policy window={}ms, analysis={}",
            config.model.name,
            config.policy.window_ms,
            config.analysis.provider.as_str()
        );
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), VisionError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`:
    /// `MIRRORCAM_MODEL`, `MIRRORCAM_PRESET`, `MIRRORCAM_ANALYSIS_PROVIDER`,
    /// `MIRRORCAM_ANALYSIS_URL`. `OPENAI_API_KEY` is read when the provider
    /// is built, not stored here.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), VisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("MIRRORCAM_MODEL") {
            self.model.name = model;
        }

        if let Some(preset) = lookup("MIRRORCAM_PRESET") {
            let preset = CapturePreset::from_str(&preset)
                .ok_or_else(|| VisionError::Config(format!("Unknown capture preset: {}", preset)))?;
            self.preset = Some(preset);
            self.policy = preset.config();
        }

        if let Some(provider) = lookup("MIRRORCAM_ANALYSIS_PROVIDER") {
            self.analysis.provider = Provider::from_str(&provider).ok_or_else(|| {
                VisionError::Config(format!("Unknown analysis provider: {}", provider))
            })?;
            if self.analysis.provider == Provider::OpenAI && self.analysis.url == DEFAULT_BACKEND_URL {
                self.analysis.url = DEFAULT_OPENAI_URL.to_string();
            }
        }

        if let Some(url) = lookup("MIRRORCAM_ANALYSIS_URL") {
            self.analysis.url = url;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), VisionError> {
        let thresholds = [
            ("nms.iou_threshold", self.nms.iou_threshold),
            ("nms.score_threshold", self.nms.score_threshold),
            ("crop.confidence_threshold", self.crop.confidence_threshold),
            ("policy.trigger_threshold", self.policy.trigger_threshold),
            ("policy.display_threshold", self.policy.display_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(VisionError::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if self.nms.max_outputs == 0 {
            return Err(VisionError::Config("nms.max_outputs must be > 0".to_string()));
        }

        if !(self.policy.dedup_cell > 0.0) || !self.policy.dedup_cell.is_finite() {
            return Err(VisionError::Config("policy.dedup_cell must be > 0".to_string()));
        }

        if self.policy.max_candidates == 0 {
            return Err(VisionError::Config(
                "policy.max_candidates must be > 0".to_string(),
            ));
        }

        if self.frame_loop.fps == 0 || self.frame_loop.fps > 120 {
            return Err(VisionError::Config(
                "frame_loop.fps must be between 1 and 120".to_string(),
            ));
        }

        if self.model.name.trim().is_empty() {
            return Err(VisionError::Config("model.name cannot be empty".to_string()));
        }

        if self.analysis.url.trim().is_empty() {
            return Err(VisionError::Config("analysis.url cannot be empty".to_string()));
        }

        Ok(())
    }
}
