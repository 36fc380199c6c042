//! mirrorcam-eye: detection-to-capture pipeline
//!
//! Turns a stream of camera frames into a single, confidently chosen crop
//! of the target class and hands it to an analysis service.
//!
//! Per frame: [`processing::preprocess`] letterboxes the frame, a
//! [`models::DetectionModel`] runs inference, [`processing::decode`] and
//! [`processing::non_max_suppression`] turn raw output into detections, and
//! [`processing::Cropper`] cuts JPEG crops. The [`capture`] state machine
//! decides when to stop looking and the [`dispatch::Dispatcher`] submits the
//! winner exactly once.

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod frame_loop;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod source;

pub use capture::{
    CaptureController, CaptureEvent, CapturePolicyConfig, CapturePreset, CaptureSession,
    CaptureState, SelectionRule,
};
pub use config::{FrameLoopConfig, MirrorcamConfig, ModelSection};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::VisionError;
pub use frame::Frame;
pub use frame_loop::{FrameLoop, LoopExit, LoopSummary};
pub use models::{DetectionModel, ModelConfig, ModelRegistry, ReplayModel};
pub use pipeline::{DetectionPipeline, FrameDetections};
pub use processing::{Crop, CropConfig, CropSpace, NmsParams};
pub use source::{FrameSource, ImageSequenceSource};
