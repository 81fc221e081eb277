//! YOLO head decoding and non-maximum suppression

use super::class_label;
use crate::error::EyeError;
use framesift_core::{BoundingBox, Detection};

/// Everything needed to turn raw head output into frame-space detections.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams<'a> {
    /// Square model input resolution the frame was resized to
    pub input_size: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub min_confidence: f32,
    pub iou_threshold: f32,
    pub class_names: &'a [String],
}

/// Decode one image of a YOLOv8/YOLO11 head laid out as `[4 + classes, anchors]`.
///
/// Rows 0..4 hold `cx, cy, w, h` in model input pixels, the rest hold per-class
/// scores. Boxes are rescaled to the original frame size.
pub fn decode_predictions(
    data: &[f32],
    num_channels: usize,
    num_anchors: usize,
    params: &DecodeParams<'_>,
) -> Result<Vec<Detection>, EyeError> {
    if num_channels <= 4 {
        return Err(EyeError::Detection(format!(
            "output has {} channels, expected at least 5",
            num_channels
        )));
    }
    if data.len() != num_channels * num_anchors {
        return Err(EyeError::Detection(format!(
            "output holds {} values, expected {}x{}",
            data.len(),
            num_channels,
            num_anchors
        )));
    }
    if params.input_size == 0 {
        return Err(EyeError::Detection("model input size is zero".to_string()));
    }

    let at = |channel: usize, anchor: usize| data[channel * num_anchors + anchor];
    let scale_x = params.frame_width as f32 / params.input_size as f32;
    let scale_y = params.frame_height as f32 / params.input_size as f32;

    let mut candidates = Vec::new();
    for anchor in 0..num_anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class_id in 0..num_channels - 4 {
            let score = at(4 + class_id, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }
        if !best_score.is_finite() || best_score < params.min_confidence {
            continue;
        }

        let bbox = BoundingBox::new(
            at(0, anchor) * scale_x,
            at(1, anchor) * scale_y,
            at(2, anchor) * scale_x,
            at(3, anchor) * scale_y,
        );
        if !bbox.is_finite() || bbox.area() <= 0.0 {
            continue;
        }

        candidates.push(Detection::new(
            best_class,
            class_label(params.class_names, best_class),
            best_score,
            bbox,
        ));
    }

    Ok(non_max_suppression(candidates, params.iou_threshold))
}

/// Greedy per-class NMS, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}
