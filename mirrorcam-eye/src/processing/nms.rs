//! Greedy non-maximum suppression

use super::decode::BoundingBox;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmsParams {
    pub max_outputs: usize,
    pub iou_threshold: f32,
    pub score_threshold: f32,
}

impl Default for NmsParams {
    fn default() -> Self {
        Self {
            max_outputs: 500,
            iou_threshold: 0.45,
            score_threshold: 0.2,
        }
    }
}

/// Returns the indices of the boxes to keep, best first.
///
/// Scores not strictly above `score_threshold` (NaN included) are dropped
/// before sorting. Equal scores keep their input order.
pub fn non_max_suppression(boxes: &[BoundingBox], scores: &[f32], params: &NmsParams) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());
    let len = boxes.len().min(scores.len());

    let mut order: Vec<usize> = (0..len)
        .filter(|&i| scores[i] > params.score_threshold)
        .collect();
    if order.is_empty() || params.max_outputs == 0 {
        return Vec::new();
    }

    // Vec::sort_by is stable, so ties stay in index order
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; order.len()];

    for i in 0..order.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(order[i]);
        if keep.len() >= params.max_outputs {
            break;
        }

        let current = &boxes[order[i]];
        for j in (i + 1)..order.len() {
            if suppressed[j] {
                continue;
            }
            if current.iou(&boxes[order[j]]) > params.iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}
