//! Per-frame processing stages

pub mod crop;
pub mod decode;
pub mod nms;
pub mod preprocess;

pub use crop::{Crop, CropBox, CropConfig, CropSpace, Cropper};
pub use decode::{decode, BoundingBox, Decoded, OutputLayout, RawOutput};
pub use nms::{non_max_suppression, NmsParams};
pub use preprocess::{preprocess, Geometry, Tensor};
