//! Detection models

pub mod decode;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use decode::{decode_predictions, non_max_suppression, DecodeParams};
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

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

/// Label for `class_id`, falling back to `class_{id}` past the end of the table.
pub fn class_label(class_names: &[String], class_id: usize) -> String {
    if class_names.is_empty() {
        COCO_CLASSES
            .get(class_id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("class_{}", class_id))
    } else {
        class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}
