use image::{Rgb, RgbImage};
use mirrorcam_eye::models::ModelConfig;
use mirrorcam_eye::processing::{
    non_max_suppression, preprocess, BoundingBox, CropConfig, Cropper, Decoded, NmsParams,
};
use mirrorcam_eye::Frame;
use proptest::prelude::*;

fn arb_box() -> impl Strategy<Value = BoundingBox> {
    (-20.0f32..120.0, -20.0f32..120.0, 0.0f32..80.0, 0.0f32..80.0)
        .prop_map(|(x1, y1, w, h)| BoundingBox::new(x1, y1, x1 + w, y1 + h))
}

fn arb_detections() -> impl Strategy<Value = (Vec<BoundingBox>, Vec<f32>, Vec<usize>)> {
    (1usize..40).prop_flat_map(|n| {
        (
            prop::collection::vec(arb_box(), n),
            prop::collection::vec(0.0f32..=1.0, n),
            prop::collection::vec(0usize..3, n),
        )
    })
}

proptest! {
    #[test]
    fn test_nms_no_kept_pair_overlaps(
        (boxes, scores, _) in arb_detections(),
        iou_threshold in 0.1f32..0.9,
    ) {
        let params = NmsParams { iou_threshold, ..NmsParams::default() };
        let keep = non_max_suppression(&boxes, &scores, &params);

        for (i, &a) in keep.iter().enumerate() {
            prop_assert!(scores[a] > params.score_threshold);
            for &b in &keep[i + 1..] {
                prop_assert!(boxes[a].iou(&boxes[b]) <= iou_threshold);
            }
        }
    }

    #[test]
    fn test_nms_keep_order_and_limit(
        (boxes, scores, _) in arb_detections(),
        max_outputs in 1usize..10,
    ) {
        let params = NmsParams { max_outputs, ..NmsParams::default() };
        let keep = non_max_suppression(&boxes, &scores, &params);

        prop_assert!(keep.len() <= max_outputs);
        prop_assert!(keep.windows(2).all(|w| scores[w[0]] >= scores[w[1]]));
        // deterministic
        prop_assert_eq!(keep, non_max_suppression(&boxes, &scores, &params));
    }

    #[test]
    fn test_crops_satisfy_gate(
        (boxes, scores, classes) in arb_detections(),
        threshold in 0.5f32..0.95,
    ) {
        let model = ModelConfig::new("tiny", "Tiny", &["hat", "shirt", "shoe"], "shirt", 100, 100).unwrap();
        let frame = Frame::new(RgbImage::from_pixel(100, 100, Rgb([90, 90, 90])));
        let tensor = preprocess(&frame, 100, 100).unwrap();
        let cropper = Cropper::new(CropConfig { confidence_threshold: threshold, ..CropConfig::default() });
        let detections = Decoded { boxes, scores, classes };

        let crops = cropper.crop(&frame, &tensor, &detections, &model).unwrap();
        for crop in &crops {
            prop_assert_eq!(crop.class_name.as_str(), "shirt");
            prop_assert!(crop.confidence >= threshold);
            prop_assert!(crop.bbox.x1 <= crop.bbox.x2);
            prop_assert!(crop.bbox.y1 <= crop.bbox.y2);
            prop_assert!(crop.bbox.x1 >= 0.0 && crop.bbox.x2 <= 100.0);
            prop_assert!(crop.bbox.y1 >= 0.0 && crop.bbox.y2 <= 100.0);
            prop_assert!(!crop.jpeg.is_empty());
        }
    }
}
