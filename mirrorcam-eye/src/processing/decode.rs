//! Raw model output to corner-form boxes, scores and classes

use crate::error::VisionError;
use serde::{Deserialize, Serialize};

/// How candidate rows are laid out in a flat output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// `[candidates, 4 + classes]`
    RowMajor,
    /// `[4 + classes, candidates]`, the native YOLOv8 export.
    ChannelMajor,
}

/// Flat detector output, one logical row per candidate:
/// `[cx, cy, w, h, score_0 .. score_{n-1}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOutputRecord")]
pub struct RawOutput {
    data: Vec<f32>,
    candidates: usize,
    columns: usize,
    layout: OutputLayout,
}

/// Unchecked serialized form; shape is validated on the way in.
#[derive(Deserialize)]
struct RawOutputRecord {
    data: Vec<f32>,
    candidates: usize,
    columns: usize,
    layout: OutputLayout,
}

impl TryFrom<RawOutputRecord> for RawOutput {
    type Error = VisionError;

    fn try_from(record: RawOutputRecord) -> Result<Self, Self::Error> {
        RawOutput::new(record.data, record.candidates, record.columns, record.layout)
    }
}

impl RawOutput {
    pub fn new(
        data: Vec<f32>,
        candidates: usize,
        columns: usize,
        layout: OutputLayout,
    ) -> Result<Self, VisionError> {
        let expected = candidates
            .checked_mul(columns)
            .ok_or_else(|| VisionError::Model("Output shape overflows".to_string()))?;
        if data.len() != expected {
            return Err(VisionError::Model(format!(
                "Output holds {} values, shape {}x{} needs {}",
                data.len(),
                candidates,
                columns,
                expected
            )));
        }
        Ok(Self {
            data,
            candidates,
            columns,
            layout,
        })
    }

    /// Builds a row-major output from explicit rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, VisionError> {
        let columns = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != columns) {
            return Err(VisionError::Model("Output rows have uneven lengths".to_string()));
        }
        let data = rows.iter().flatten().copied().collect();
        Self::new(data, rows.len(), columns, OutputLayout::RowMajor)
    }

    pub fn empty(columns: usize) -> Self {
        Self {
            data: Vec::new(),
            candidates: 0,
            columns,
            layout: OutputLayout::RowMajor,
        }
    }

    pub fn candidates(&self) -> usize {
        self.candidates
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    fn value(&self, candidate: usize, column: usize) -> f32 {
        match self.layout {
            OutputLayout::RowMajor => self.data[candidate * self.columns + column],
            OutputLayout::ChannelMajor => self.data[column * self.candidates + candidate],
        }
    }
}

/// Corner-form box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let x1 = cx - w / 2.0;
        let y1 = cy - h / 2.0;
        Self {
            x1,
            y1,
            x2: x1 + w,
            y2: y1 + h,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union; 0 when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let area_a = self.area();
        let area_b = other.area();
        if area_a <= 0.0 || area_b <= 0.0 {
            return 0.0;
        }

        let inter_x1 = self.x1.max(other.x1);
        let inter_y1 = self.y1.max(other.y1);
        let inter_x2 = self.x2.min(other.x2);
        let inter_y2 = self.y2.min(other.y2);
        let inter_area = (inter_x2 - inter_x1).max(0.0) * (inter_y2 - inter_y1).max(0.0);

        let union_area = area_a + area_b - inter_area;
        if union_area <= 0.0 || !union_area.is_finite() {
            return 0.0;
        }
        inter_area / union_area
    }
}

/// Decoder output: parallel sequences, one entry per candidate, input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub boxes: Vec<BoundingBox>,
    pub scores: Vec<f32>,
    pub classes: Vec<usize>,
}

impl Decoded {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Gathers the entries at `indices`, in that order.
    pub fn gather(&self, indices: &[usize]) -> Decoded {
        Decoded {
            boxes: indices.iter().map(|&i| self.boxes[i]).collect(),
            scores: indices.iter().map(|&i| self.scores[i]).collect(),
            classes: indices.iter().map(|&i| self.classes[i]).collect(),
        }
    }
}

/// Converts every candidate row to a corner-form box plus its best class.
///
/// Only the first `num_classes` score columns are read. Ties in the class
/// scores resolve to the lowest index.
pub fn decode(output: &RawOutput, num_classes: usize) -> Result<Decoded, VisionError> {
    if num_classes == 0 {
        return Err(VisionError::Model("Model declares no classes".to_string()));
    }
    if output.candidates() == 0 {
        return Ok(Decoded::default());
    }
    if output.columns() < 4 + num_classes {
        return Err(VisionError::Model(format!(
            "Output has {} columns, expected at least {} (4 box + {} classes)",
            output.columns(),
            4 + num_classes,
            num_classes
        )));
    }

    let n = output.candidates();
    let mut decoded = Decoded {
        boxes: Vec::with_capacity(n),
        scores: Vec::with_capacity(n),
        classes: Vec::with_capacity(n),
    };

    for i in 0..n {
        decoded.boxes.push(BoundingBox::from_center(
            output.value(i, 0),
            output.value(i, 1),
            output.value(i, 2),
            output.value(i, 3),
        ));

        let mut best_class = 0;
        let mut best_score = output.value(i, 4);
        for class in 1..num_classes {
            let score = output.value(i, 4 + class);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        decoded.scores.push(best_score);
        decoded.classes.push(best_class);
    }

    Ok(decoded)
}
