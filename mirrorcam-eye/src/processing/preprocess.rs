//! Letterbox preprocessing: pad to a square, resize, normalize

use crate::error::VisionError;
use crate::frame::Frame;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Model input derived from one frame.
///
/// `data` is NCHW (`[1, 3, height, width]`) with values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub geometry: Geometry,
    /// The padded and resized picture the model sees.
    pub image: RgbImage,
}

/// Everything needed to map tensor coordinates back to the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// padded size / source width
    pub x_ratio: f32,
    /// padded size / source height
    pub y_ratio: f32,
    pub padded_size: u32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Geometry {
    /// Tensor-space x to source-space x.
    pub fn source_x(&self, x: f32) -> f32 {
        x * self.padded_size as f32 / self.input_width as f32
    }

    /// Tensor-space y to source-space y.
    pub fn source_y(&self, y: f32) -> f32 {
        y * self.padded_size as f32 / self.input_height as f32
    }
}

impl Tensor {
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }

    /// Constant-valued input used to warm a model up.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        let len = 3 * width as usize * height as usize;
        Self {
            data: vec![value; len],
            width,
            height,
            geometry: Geometry {
                x_ratio: 1.0,
                y_ratio: 1.0,
                padded_size: width.max(height),
                input_width: width,
                input_height: height,
            },
            image: RgbImage::new(width, height),
        }
    }
}

/// Pads `frame` bottom/right to a square, resizes it to the model input and
/// scales pixels to `[0, 1]`.
pub fn preprocess(frame: &Frame, input_width: u32, input_height: u32) -> Result<Tensor, VisionError> {
    if frame.is_empty() {
        return Err(VisionError::InvalidFrame {
            width: frame.width(),
            height: frame.height(),
        });
    }
    if input_width == 0 || input_height == 0 {
        return Err(VisionError::Config(format!(
            "Model input size must be non-zero, got {}x{}",
            input_width, input_height
        )));
    }

    let (width, height) = (frame.width(), frame.height());
    let max_size = width.max(height);

    let mut padded = RgbImage::new(max_size, max_size);
    imageops::replace(&mut padded, frame.image(), 0, 0);

    let resized = if max_size == input_width && max_size == input_height {
        padded
    } else {
        imageops::resize(&padded, input_width, input_height, FilterType::Triangle)
    };

    let data = to_chw(&resized);

    Ok(Tensor {
        data,
        width: input_width,
        height: input_height,
        geometry: Geometry {
            x_ratio: max_size as f32 / width as f32,
            y_ratio: max_size as f32 / height as f32,
            padded_size: max_size,
            input_width,
            input_height,
        },
        image: resized,
    })
}

fn to_chw(image: &RgbImage) -> Vec<f32> {
    let plane = image.width() as usize * image.height() as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (i, pixel) in image.pixels().enumerate() {
        data[i] = pixel[0] as f32 / 255.0;
        data[plane + i] = pixel[1] as f32 / 255.0;
        data[2 * plane + i] = pixel[2] as f32 / 255.0;
    }
    data
}
